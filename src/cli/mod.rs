mod serve;

use anyhow::Result;
use console::style;

pub fn print_info(msg: &str) {
    println!("{}", style(msg).blue());
}

pub fn print_error(msg: &str) {
    eprintln!("{}", style(msg).red().bold());
}

fn print_help() {
    println!();
    println!(" {}", style("drover — fleet control plane").bold());
    println!();
    println!(" {}", style("Commands").bold().underlined());
    println!(
        "   {}   Run the control plane (API, scheduler, dispatch engine)",
        style("serve").green().bold()
    );
    println!("   {}    Show this help", style("help").green().bold());
    println!();
    println!(" {}", style("serve flags").bold().underlined());
    println!("   --api-host <host>        Bind address (default 127.0.0.1)");
    println!("   --api-port <port>        API port (default 18740)");
    println!("   --data-dir <dir>         State directory (default ~/.drover)");
    println!("   --overlap-timeout <sec>  In-progress staleness window (default 300)");
    println!();
    println!(
        " {} {} <command> [flags]",
        style("Usage:").bold(),
        style("drover").green()
    );
    println!();
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => serve::run(serve::parse_args(&args)).await,
        Some("help") | None => {
            print_help();
            Ok(())
        }
        Some(other) => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            Ok(())
        }
    }
}
