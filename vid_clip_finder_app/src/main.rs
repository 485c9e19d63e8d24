mod app;

fn main() {
    let exit_code = app::run_app();
    std::process::exit(exit_code);
}
