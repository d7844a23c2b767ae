use colored::Colorize;

use crate::settings::{save_settings, shellexpand_path, Settings};

pub fn run(data_dir: Option<String>, db: Option<&str>) -> anyhow::Result<()> {
    if let Some(dir) = data_dir {
        let settings = Settings {
            data_dir: shellexpand_path(&dir),
        };
        save_settings(&settings)?;
    }
    super::connect(db)?;
    println!("{}", "Database initialized.".green());
    Ok(())
}
