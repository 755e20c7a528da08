//! `credvault actions`: list the audit actions that can be filtered on.

use crate::audit::AuditAction;
use crate::errors::Result;

/// Execute the `actions` command.
pub fn execute() -> Result<()> {
    for action in AuditAction::ALL {
        println!("{:<20} {}", action.as_str(), action.label());
    }
    Ok(())
}
