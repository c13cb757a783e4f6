fn main() {
    if let Err(err) = patient_migrate::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
