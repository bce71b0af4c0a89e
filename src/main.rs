use server_installer::config::{AppPaths, GlobalConfig};
use server_installer::supervisor::ProcessExit;
use server_installer::utils::center_text;
use server_installer::{logging, session};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn banner() -> String {
    let version = center_text(&format!("v{}", VERSION), 15);
    format!(
        "
   ________________
  /               /|
 /_______________/ |
|   Minecraft   |  |
|     Server    |  |
|   Installer   |  |
|{}| /
|_______________|/
------------------------------------------------------------",
        version
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("{}", banner());

    let paths = AppPaths::resolve();
    paths.bootstrap()?;
    let config_file = paths.config_file();
    let fresh_config = !config_file.exists();
    let config = GlobalConfig::load(&config_file)?;
    logging::init(&config, &paths)?;

    if fresh_config {
        tracing::info!("Created default configuration at {}", config_file.display());
    }
    tracing::info!("Server installer v{} starting in {}", VERSION, paths.root.display());

    let exit = match session::run(&paths, &config).await {
        Ok(exit) => exit,
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server process ended ({})", exit);
    let code = match exit {
        ProcessExit::Exited(code) => code,
        ProcessExit::Killed => 1,
    };
    std::process::exit(code);
}
