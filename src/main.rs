fn main() -> std::process::ExitCode {
    capsignal_lib::run()
}
