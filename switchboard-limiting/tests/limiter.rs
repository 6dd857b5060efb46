use switchboard_limiting::{ConcurrencyLimiter, LimitBehavior, Outcome};

fn run(limiter: &ConcurrencyLimiter, outcomes: &[Outcome]) {
    for outcome in outcomes {
        limiter
            .acquire()
            .expect("serial execution never exhausts the limit")
            .release(*outcome);
    }
}

#[test]
fn aimd_trajectory() {
    let limiter = ConcurrencyLimiter::new(LimitBehavior::Host);

    // Serial successes creep the limit upward by 1 / limit each.
    run(&limiter, &[Outcome::Success; 40]);
    let after_successes = limiter.limit();
    assert!(
        (21.8..22.0).contains(&after_successes),
        "limit after 40 successes: {after_successes}"
    );

    // One drop collapses the limit multiplicatively.
    run(&limiter, &[Outcome::Dropped]);
    let after_drop = limiter.limit();
    assert!(
        (after_drop - after_successes * 0.9).abs() < 1e-9,
        "limit after drop: {after_drop}"
    );

    // Recovery is additive again.
    run(&limiter, &[Outcome::Success; 50]);
    let recovered = limiter.limit();
    assert!(
        (22.0..22.3).contains(&recovered),
        "limit after recovery: {recovered}"
    );
}

#[test]
fn limit_is_a_deterministic_function_of_the_outcome_sequence() {
    let outcomes: Vec<Outcome> = (0..200)
        .map(|i| match i % 7 {
            0 | 1 => Outcome::Dropped,
            2 => Outcome::Ignored,
            _ => Outcome::Success,
        })
        .collect();

    let first = ConcurrencyLimiter::new(LimitBehavior::Host);
    let second = ConcurrencyLimiter::new(LimitBehavior::Host);
    run(&first, &outcomes);
    run(&second, &outcomes);

    assert_eq!(first.limit().to_bits(), second.limit().to_bits());
    assert_eq!(0, first.in_flight());
}

#[test]
fn in_flight_never_exceeds_the_admission_ceiling() {
    let limiter = ConcurrencyLimiter::new(LimitBehavior::Host);

    let mut permits = Vec::new();
    while let Some(permit) = limiter.acquire() {
        permits.push(permit);
        assert!(permits.len() <= 1000, "runaway admission");
    }

    assert_eq!(limiter.in_flight(), permits.len());
    let ceiling = limiter.limit().ceil();
    assert!((limiter.in_flight() as f64) <= ceiling);

    for permit in permits {
        permit.release(Outcome::Success);
    }
    assert_eq!(0, limiter.in_flight());
}

#[test]
fn endpoint_behavior_shares_the_host_constants() {
    let limiter = ConcurrencyLimiter::new(LimitBehavior::Endpoint);

    assert!((limiter.limit() - 20.0).abs() < 1e-9);
    assert_eq!(LimitBehavior::Endpoint, limiter.behavior());
}
