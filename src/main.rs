use clap::Parser;
use metaquant::cli::Args;
use metaquant::cli::Commands;
use metaquant::params_generator;
use metaquant::pipelines::quantify;

fn main() {
    let args = Args::parse();

    match args.command {
        Commands::Run {
            input,
            param,
            output,
            gene_table,
        } => {
            println!(
                "Running quantification pipeline with input: {}, param: {}, output: {}",
                input, param, output
            );
            if let Err(e) = quantify::quantify(&input, &param, &output, gene_table) {
                eprintln!("Pipeline failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Generate {} => {
            params_generator::exec();
        }
    }
}
