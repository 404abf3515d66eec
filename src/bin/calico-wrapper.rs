use calico_wrapper::commands::run_wrapper;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() {
    // stdout carries the CNI result and stderr belongs to the delegate,
    // so logging stays off unless RUST_LOG asks for it
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")),
        )
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);

    std::process::exit(run_wrapper());
}
