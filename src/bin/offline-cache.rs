use env_logger::Env;

#[tokio::main]
async fn main() -> offline_cache::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    #[cfg(feature = "cli")]
    {
        if let Err(e) = offline_cache::cli::run().await {
            if matches!(e, offline_cache::Error::Usage(_)) {
                eprintln!("Error: {e}\n");
                offline_cache::cli::print_usage();
                std::process::exit(2);
            }
            return Err(e);
        }
        Ok(())
    }
    #[cfg(not(feature = "cli"))]
    {
        eprintln!("CLI support not compiled in");
        std::process::exit(1);
    }
}
