/// Rating every item starts from before its first judgment.
pub const INITIAL_MU: f64 = 1500.0;

/// Starting variance of a fresh item. Also the reference point for the
/// adaptive step size: an item still at this variance moves twice as far per
/// judgment as a fully converged one.
pub const INITIAL_SIGMA_SQ: f64 = 350_000.0;

/// Base step size of the logistic update (chess Elo's classic K).
pub const K_BASE: f64 = 32.0;

/// Multiplier applied to both items' variance after every judgment, whatever
/// the outcome. Must stay strictly inside (0, 1).
pub const SIGMA_DECAY: f64 = 0.85;

/// Rating difference that turns a 10:1 expected-score ratio in the logistic model.
pub const LOGISTIC_SCALE: f64 = 400.0;

/// Separator used when building canonical pair keys. Item ids containing it are
/// still accepted; the key is only ever compared, never parsed back.
pub const PAIR_KEY_SEPARATOR: char = '|';

/// z-value for the 95% interval reported alongside rankings.
pub const RANKING_INTERVAL_Z: f64 = 1.96;
