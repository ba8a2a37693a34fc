use std::process::ExitCode;

fn main() -> ExitCode {
    stockinfo_cli::run()
}
