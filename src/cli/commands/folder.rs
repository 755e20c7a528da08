//! `credvault folder`: create and list folders.

use comfy_table::{ContentArrangement, Table};

use crate::cli::output;
use crate::cli::{actor, open_vault, Cli};
use crate::errors::Result;

/// Execute `folder add`.
pub fn execute_add(cli: &Cli, name: &str) -> Result<()> {
    let mut vault = open_vault(cli)?;
    let folder = vault.create_folder(&actor(cli), name)?;
    output::success(&format!("Created folder '{}'", folder.name));
    Ok(())
}

/// Execute `folder list`.
pub fn execute_list(cli: &Cli) -> Result<()> {
    let vault = open_vault(cli)?;
    let folders = vault.list_folders(&actor(cli))?;

    if folders.is_empty() {
        output::info("No folders yet.");
        output::tip("Run `credvault folder add <NAME>` to create one.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Created"]);
    for f in &folders {
        table.add_row(vec![
            f.name.clone(),
            f.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}
