fn main() {
    if let Err(err) = formtree::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
