#[tokio::main]
async fn main() {
    match torque::cli::run_cli().await {
        Ok(summary) => println!("{}", summary),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
