fn main() -> std::process::ExitCode {
    tubearc_lib::run()
}
