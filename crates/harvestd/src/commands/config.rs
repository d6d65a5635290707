//! Module for the "config" command.

use super::*;

/// Arguments for [`Commands::Config`]
#[derive(Args, Clone)]
pub struct ConfigArgs {
  /// Write the effective configuration to the config file. API keys that only come from the
  /// environment are left out
  #[arg(long)]
  pub save: bool,
}

/// Function for the [`Commands::Config`] in the CLI.
pub fn show_config(config: &Config, path: &Path, args: ConfigArgs) -> Result<()> {
  println!("{} Configuration", style(INFO_PREFIX).cyan());
  println!("{config}");
  println!("\n{} Config file:        {}", style(INFO_PREFIX).cyan(), path.display());

  let problems = config.validate();
  if problems.is_empty() {
    println!("{} All services configured", style(SUCCESS_PREFIX).green());
  } else {
    println!();
    print_warnings(config);
  }

  if args.save {
    let stored = Config::read_file(path)?;
    config.without_new_secrets(stored.as_ref()).save(path)?;
    println!("{} Saved configuration to {}", style(SUCCESS_PREFIX).green(), path.display());
  }
  Ok(())
}
