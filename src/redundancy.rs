//! Recovery-count planning from loss, group size, and target residual loss.
//! See [`plan_recovery_count`].

/// Upper bound on recovery symbols planned for a single group, matched to
/// the erasure coder's practical parity-shard ceiling.
pub const MAX_RECOVERY_PER_GROUP: u16 = 32;

/// Chooses the smallest recovery count `r` such that, assuming independent
/// per-packet loss with probability `loss`, the probability of losing more
/// than `r` of the `originals + r` total symbols is at most `target_loss`.
///
/// Computed directly via the binomial survival function rather than a
/// lookup table: group sizes here stay small enough ([`MAX_RECOVERY_PER_GROUP`]
/// plus [`crate::encoder::MAX_GROUP_ORIGINALS`]) that exact per-call
/// computation is cheap.
#[must_use]
pub fn plan_recovery_count(loss: f64, originals: u16, target_loss: f64) -> u16 {
    let loss = loss.clamp(0.0, 1.0);
    if loss <= 0.0 {
        return 0;
    }

    for r in 0..=MAX_RECOVERY_PER_GROUP {
        let n = u32::from(originals) + u32::from(r);
        if upper_tail(n, r, loss) <= target_loss {
            return r;
        }
    }
    MAX_RECOVERY_PER_GROUP
}

/// `P(X > r)` for `X ~ Binomial(n, p)`, computed by summing the pmf from
/// `r+1` to `n` using the standard ratio recurrence
/// `pmf(k+1) = pmf(k) * (n-k)/(k+1) * p/(1-p)` to avoid evaluating
/// factorials directly.
fn upper_tail(n: u32, r: u16, p: f64) -> f64 {
    let r = u32::from(r);
    if r >= n {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }

    let q = 1.0 - p;
    #[allow(clippy::cast_precision_loss)]
    let mut pmf = q.powi(n as i32);
    // cdf starts as pmf(0) = P(X <= 0); each iteration advances pmf to the
    // next term and folds it in, so after `r` iterations cdf = P(X <= r)
    let mut cdf = pmf;
    for k in 0..r {
        #[allow(clippy::cast_precision_loss)]
        let (k_f, n_f) = (k as f64, n as f64);
        pmf *= (n_f - k_f) / (k_f + 1.0) * (p / q);
        cdf += pmf;
    }
    (1.0 - cdf).clamp(0.0, 1.0)
}
