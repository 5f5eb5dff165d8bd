use std::process::ExitCode;

fn main() -> ExitCode {
    camrelay::run()
}
