// Entrypoint for the CLI application.
// - `zenodo [--sandbox] <deposition-id> <path>...` uploads the given files
//   as a new version of an existing deposition.
// - With no arguments, an interactive menu covers the remaining flows.

use anyhow::Context;
use std::path::PathBuf;
use zenodo_client::ui;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let sandbox = if let Some(pos) = args.iter().position(|arg| arg == "--sandbox") {
        args.remove(pos);
        true
    } else {
        false
    };

    let api = ui::client_or_login(sandbox)?;

    if args.is_empty() {
        // Interactive menu; blocks until the user exits.
        return ui::main_menu(api);
    }

    if args.len() < 2 {
        anyhow::bail!("usage: zenodo [--sandbox] <deposition-id> <path>...");
    }
    let deposition_id: u64 = args[0]
        .parse()
        .with_context(|| format!("deposition id {:?} must be numeric", args[0]))?;
    let paths: Vec<PathBuf> = args[1..].iter().map(PathBuf::from).collect();
    ui::run_update(&api, deposition_id, &paths)
}
