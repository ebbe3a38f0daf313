use proptest::prelude::*;

use super::{START_NS, SYS_A, SYS_B, SYS_C};
use crate::testing::{SimClock, SimNetwork, sim_config};

proptest! {
    // Each case simulates a three system chain for several seconds.
    #![proptest_config(ProptestConfig::with_cases(6))]

    #[test]
    fn test_chain_agrees_on_best_grandmaster(
        priorities in proptest::array::uniform3(1u8..255),
        delays in proptest::array::uniform2(100u64..700),
    ) {
        let ids = [SYS_A, SYS_B, SYS_C];
        let mut net = SimNetwork::new();
        for (n, (&id, &priority1)) in ids.iter().zip(&priorities).enumerate() {
            let ports = if n == 1 { 2 } else { 1 };
            let start = START_NS * (n as u64 + 1);
            net.add_system(sim_config(id, priority1, ports), SimClock::new(start)).unwrap();
        }
        net.connect(0, 0, 1, 0, delays[0]);
        net.connect(1, 1, 2, 0, delays[1]);
        net.start();
        net.run_for(12_000);

        let best = (0..3).min_by_key(|&n| (priorities[n], ids[n])).unwrap();
        for n in 0..3 {
            let system = net.system(n);
            prop_assert_eq!(system.grandmaster_identity(0), Some(ids[best]));
            prop_assert_eq!(system.is_grandmaster(0), n == best);
        }
    }
}
