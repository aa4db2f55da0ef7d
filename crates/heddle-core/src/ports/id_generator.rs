//! TokenGenerator port - インスタンストークン生成の抽象化
//!
//! Tokens are produced on the caller's side, not by the store. ULIDs need no
//! coordination between hosts, which is what a store shared by independent
//! processes wants.

use ulid::Ulid;

use crate::domain::InstanceToken;
use crate::ports::Clock;

pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> InstanceToken;
}

/// ULID ベースのトークン生成器 (`inst-<ulid>`).
///
/// The time component comes from the injected clock, so a `FixedClock`
/// yields tokens with a deterministic prefix.
pub struct UlidTokenGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidTokenGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> TokenGenerator for UlidTokenGenerator<C> {
    fn generate(&self) -> InstanceToken {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        InstanceToken::new(format!("inst-{}", ulid.to_string().to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_tokens() {
        let id_gen = UlidTokenGenerator::new(SystemClock);

        let t1 = id_gen.generate();
        let t2 = id_gen.generate();
        let t3 = id_gen.generate();

        assert_ne!(t1, t2);
        assert_ne!(t2, t3);
        assert_ne!(t1, t3);
        assert!(t1.as_str().starts_with("inst-"));
    }

    #[test]
    fn fixed_clock_pins_the_timestamp_part() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidTokenGenerator::new(FixedClock::new(fixed_time));

        let t1 = id_gen.generate();
        let t2 = id_gen.generate();

        // ランダム部分があるので token は異なるが、timestamp 部分は同じ
        assert_ne!(t1, t2);
        let ts = |t: &InstanceToken| {
            Ulid::from_string(&t.as_str()["inst-".len()..].to_uppercase())
                .unwrap()
                .timestamp_ms()
        };
        assert_eq!(ts(&t1), fixed_time.timestamp_millis() as u64);
        assert_eq!(ts(&t1), ts(&t2));
    }
}
