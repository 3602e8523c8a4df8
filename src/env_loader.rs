use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(vault_root: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    let base = vault_root.or(home_dir)?;
    Some(base.join("chanvault/.env"))
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("CHANVAULT_DIR").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}
