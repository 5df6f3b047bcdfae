//! Built-in leaf policies

mod pick_first;
mod round_robin;

pub use pick_first::{PickFirst, PickFirstConfig, PickFirstFactory, PICK_FIRST_POLICY_NAME};
pub use round_robin::{
    RoundRobin, RoundRobinConfig, RoundRobinFactory, RoundRobinPicker, ROUND_ROBIN_POLICY_NAME,
};

use std::sync::Arc;

use crate::policy::{
    ChannelControlHelper, ConnectivityState, FailPicker, PolicyError, ServerAddress, UpdateArgs,
};
use crate::registry::{PolicyRegistryBuilder, RegistryError};

/// Register every built-in leaf policy
pub fn register_builtin_policies(builder: &mut PolicyRegistryBuilder) -> Result<(), RegistryError> {
    builder.register(Arc::new(PickFirstFactory))?;
    builder.register(Arc::new(RoundRobinFactory))?;
    Ok(())
}

/// Resolve the address list a leaf policy should use for this update.
///
/// On a resolver error the previous list is kept if there is one. When no
/// usable list remains, the policy is put into TRANSIENT_FAILURE, a
/// re-resolution is requested and the failure status is returned.
pub(crate) fn usable_addresses(
    policy: &str,
    helper: &dyn ChannelControlHelper,
    args: UpdateArgs,
    previous: &[ServerAddress],
) -> Result<Option<Vec<ServerAddress>>, PolicyError> {
    let status = match args.addresses {
        Ok(addresses) if !addresses.is_empty() => return Ok(Some(addresses)),
        Ok(_) => PolicyError::Unavailable(if args.resolution_note.is_empty() {
            "empty address list".to_string()
        } else {
            format!("empty address list: {}", args.resolution_note)
        }),
        Err(e) if !previous.is_empty() => {
            tracing::warn!(policy, error = %e, "Resolver error, keeping previous addresses");
            return Ok(None);
        }
        Err(e) => e,
    };

    tracing::warn!(policy, status = %status, "No usable addresses");
    helper.update_state(
        ConnectivityState::TransientFailure,
        Err(status.clone()),
        Arc::new(FailPicker::new(status.clone())),
    );
    helper.request_reresolution();
    Err(status)
}
