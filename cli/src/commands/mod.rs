pub mod identity;
pub mod permissions;
pub mod site;
pub mod state;

use clap::Args;
use provisioning::VerifyPolicy;
use std::time::Duration;

/// Post-grant verification flags shared by the grant commands.
#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Times to re-query before reporting a grant as not yet visible
    #[arg(long, default_value_t = 1)]
    pub verify_attempts: u32,

    /// Seconds to wait between verification attempts
    #[arg(long, default_value_t = 10)]
    pub verify_delay_secs: u64,
}

impl VerifyArgs {
    pub fn policy(&self) -> VerifyPolicy {
        if self.verify_attempts <= 1 {
            VerifyPolicy::single_shot()
        } else {
            VerifyPolicy::polling(
                self.verify_attempts,
                Duration::from_secs(self.verify_delay_secs),
            )
        }
    }
}
