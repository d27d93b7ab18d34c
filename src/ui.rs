// Terminal flows: a `dialoguer` menu over the API client, spinners while
// requests are in flight, and the token prompt for first runs.

use crate::api::Zenodo;
use crate::config::ConfigStore;
use anyhow::Result;
use dialoguer::{Confirm, Input, Password, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

/// Build a client, prompting for an API token when none is configured and
/// persisting it through the config store so later runs reuse it.
pub fn client_or_login(sandbox: bool) -> Result<Zenodo> {
    match Zenodo::new(None, sandbox) {
        Ok(api) => Ok(api),
        Err(_) => {
            println!("No API token configured for this service.");
            let token: String = Password::new().with_prompt("API token").interact()?;
            let store = ConfigStore::new(if sandbox { "zenodo:sandbox" } else { "zenodo" });
            store.set("api_token", &token)?;
            Zenodo::new(Some(token), sandbox)
        }
    }
}

/// Main interactive menu. Receives a client and runs a select loop until
/// the user chooses "Exit".
pub fn main_menu(api: Zenodo) -> Result<()> {
    loop {
        let items = vec![
            "Upload new version of a deposition",
            "Download a record file",
            "Publish a draft deposition",
            "Exit",
        ];
        let selection = Select::new().items(&items).default(0).interact()?;
        match selection {
            0 => handle_update(&api)?,
            1 => handle_download(&api)?,
            2 => handle_publish(&api)?,
            3 => break,
            _ => {}
        }
    }
    Ok(())
}

/// Upload the given files as a new version of an existing deposition and
/// publish the result. Shared by the menu and the argument-driven entry.
pub fn run_update(api: &Zenodo, deposition_id: u64, paths: &[PathBuf]) -> Result<()> {
    let spinner = spinner(format!(
        "Uploading {} file(s) to deposition {deposition_id}...",
        paths.len()
    ))?;
    let deposition = api.update(deposition_id, paths, true)?;
    spinner.finish_and_clear();
    println!("Deposition {} updated and published.", deposition.id);
    if let Some(html) = &deposition.links.record_html {
        println!("See {html}");
    }
    Ok(())
}

/// Collect a deposition id and file paths, then run the update flow.
fn handle_update(api: &Zenodo) -> Result<()> {
    let deposition_id: u64 = Input::new().with_prompt("Deposition id").interact_text()?;
    let mut paths = Vec::new();
    loop {
        let path: String = Input::new().with_prompt("File path").interact_text()?;
        paths.push(PathBuf::from(path));
        if !Confirm::new().with_prompt("Add another file?").interact()? {
            break;
        }
    }
    match run_update(api, deposition_id, &paths) {
        Ok(()) => {}
        Err(e) => println!("Update failed: {e}"),
    }
    Ok(())
}

/// Download a named file from a record into the local cache.
fn handle_download(api: &Zenodo) -> Result<()> {
    let record_id: u64 = Input::new().with_prompt("Record id").interact_text()?;
    let name: String = Input::new().with_prompt("File name").interact_text()?;
    let latest = Confirm::new()
        .with_prompt("Resolve the latest version first?")
        .interact()?;
    let force = Confirm::new()
        .with_prompt("Re-download if already cached?")
        .interact()?;

    let spinner = spinner(format!("Downloading {name}..."))?;
    let result = if latest {
        api.download_latest(record_id, &name, force)
    } else {
        api.download(record_id, &name, force)
    };
    spinner.finish_and_clear();
    match result {
        Ok(path) => println!("Saved to {}", path.display()),
        Err(e) => println!("Download failed: {e}"),
    }
    Ok(())
}

/// Publish a draft deposition after confirmation.
fn handle_publish(api: &Zenodo) -> Result<()> {
    let deposition_id: u64 = Input::new().with_prompt("Deposition id").interact_text()?;
    if !Confirm::new()
        .with_prompt("Publishing is permanent. Continue?")
        .interact()?
    {
        return Ok(());
    }
    let spinner = spinner("Publishing...".to_string())?;
    let result = api.publish(deposition_id, true);
    spinner.finish_and_clear();
    match result {
        Ok(deposition) => {
            println!("Published deposition {}.", deposition.id);
            if let Some(doi) = &deposition.doi {
                println!("DOI: {doi}");
            }
        }
        Err(e) => println!("Publish failed: {e}"),
    }
    Ok(())
}

fn spinner(message: String) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}
