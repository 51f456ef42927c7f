//! Mock construction helpers

use blockflow::{Initializer, PropertyContainer};
use mockall::mock;

mock! {
    pub Init {}

    impl Initializer for Init {
        fn initialize(&mut self, container: &PropertyContainer) -> blockflow::Result<()>;
        fn shutdown(&mut self, container: &PropertyContainer);
    }
}

/// An initializer that succeeds once and expects one shutdown
pub fn ok_initializer() -> MockInit {
    let mut init = MockInit::new();
    init.expect_initialize().times(1).returning(|_| Ok(()));
    init.expect_shutdown().times(1).return_const(());
    init
}
