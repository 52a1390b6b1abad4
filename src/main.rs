fn main() {
    if let Err(err) = trailscan::run() {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
