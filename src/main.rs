fn main() {
    if let Err(err) = chatfront::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
