//! `nvrlink targets`: show how cameras collapse into per-host streams.

use std::io::Write;

use nvrlink_config::Config;

use crate::error::CliError;

pub fn handle(config: &Config) -> Result<(), CliError> {
    let targets = config.targets()?;
    let mut out = std::io::stdout().lock();

    for target in &targets {
        let scheme = if target.use_insecure_transport() {
            "http"
        } else {
            "https"
        };
        let codes: Vec<&str> = target
            .watched_event_codes()
            .iter()
            .map(String::as_str)
            .collect();
        let cameras: Vec<String> = config
            .cameras
            .iter()
            .filter(|c| c.host.trim() == target.host())
            .map(|c| format!("{}#{}", c.name, c.index))
            .collect();

        writeln!(
            out,
            "{host}\t{scheme}\t{user}\t{codes}\t{cameras}",
            host = target.host(),
            user = target.username(),
            codes = codes.join(","),
            cameras = cameras.join(","),
        )?;
    }
    Ok(())
}
