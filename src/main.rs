fn main() -> std::process::ExitCode {
    explorer_lib::run()
}
