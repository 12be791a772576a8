fn main() {
    if let Err(error) = ctlpanel_cli::run() {
        eprintln!("Error: {error:#}");
        std::process::exit(1);
    }
}
