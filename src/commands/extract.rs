//! Extract command handler: print recognized links without processing them.

use anyhow::Result;
use linkrelay_core::extract_links;
use tracing::info;

use crate::app::input;
use crate::cli::ExtractArgs;

pub fn run_extract_command(args: &ExtractArgs) -> Result<()> {
    let Some(text) = input::read_text_input(&args.text)? else {
        info!("No input provided. Pass text as arguments or pipe it via stdin.");
        return Ok(());
    };
    let links = extract_links(&text);
    info!(count = links.len(), "Extracted links");
    for link in links {
        println!("{link}");
    }
    Ok(())
}
