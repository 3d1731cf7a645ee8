use std::env;
use std::process;

fn main() {
  let args: Vec<String> = env::args().collect();
  if args.len() < 2 {
    let program = args.first().map(String::as_str).unwrap_or("tisp");
    tisp::driver::print_usage(program);
    process::exit(1);
  }

  if let Err(err) = tisp::driver::run(&args) {
    eprintln!("error: {err}");
    process::exit(1);
  }
}
