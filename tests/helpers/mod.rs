//! Shared scaffolding for routefs integration tests.

use std::sync::Once;

use routefs::Core;

static INIT: Once = Once::new();

/// Install a subscriber once so dispatch traces show up under
/// `cargo test -- --nocapture`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().try_init();
    });
}

/// A fresh core with the directories most tests want.
pub fn seeded_core() -> Core {
    init_tracing();
    let core = Core::new();
    core.mkdir("/data", 0o755).expect("mkdir /data");
    core.mkdir("/foo", 0o755).expect("mkdir /foo");
    core
}
