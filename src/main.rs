use solid_auth::core;
use solid_auth::status::ExitStatus;

/// Entry point - core::run() handles Ctrl+C itself
///
/// Returns ExitStatus directly, which implements std::process::Termination.
fn main() -> ExitStatus {
    let args: Vec<String> = std::env::args().collect();
    core::run(args)
}
