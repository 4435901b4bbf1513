//! Fuzz target for rotation against the reference model
//!
//! Decodes a team shape, a seed and an operation sequence, then drives the
//! real engines and the model side by side on a paused runtime.
//!
//! # Invariants
//!
//! - Every operation yields the result the model predicts
//! - Ledger generation and member roles match the model after every step
//! - The standard rotation invariants hold after every step

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rekey_harness::{InvariantRegistry, ModelTeam, Operation, SimWorld, TeamShape};

#[derive(Debug, Arbitrary)]
struct Input {
    seed: u64,
    shape: TeamShape,
    ops: Vec<Operation>,
}

fuzz_target!(|input: Input| {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime");

    runtime.block_on(async {
        let registry = InvariantRegistry::standard();
        let mut model = ModelTeam::new(input.shape);
        let mut world = SimWorld::new(input.seed, input.shape).await.expect("world setup");

        for (step, op) in input.ops.into_iter().take(32).enumerate() {
            let op = op.normalized();
            let expected = model.apply(&op);
            assert_eq!(world.apply(&op).await, expected, "step {step} {op:?}");
            assert_eq!(world.observable().await.expect("observable"), model.observable());

            let snapshot = world.snapshot().await.expect("snapshot");
            registry.assert_all(&snapshot, &format!("after step {step}"));
        }
    });
});
