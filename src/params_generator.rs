use std::io::{self, Write};

use crate::cli::BANNER;
use crate::helper::params::{HitStorageMode, QuantParams};

pub fn exec() {
    println!("{}", BANNER);

    println!("{}", "-".repeat(62));
    println!(
        "| JSON Parameter Generator for metaquant {} |",
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", "-".repeat(62));

    print!("Enter the path to the reaction catalog file (reaction \\t EC \\t genes):\n>  ");
    let reactions_database = collect_input();

    print!("Enter the path to the pathway catalog file:\n>  ");
    let pathways_database = collect_input();

    print!("Is the pathway catalog structured (AND/OR trees)? (y/n, default as n):\n>  ");
    let pathways_structured = matches!(collect_input().as_str(), "y" | "Y");

    let recurse_flat_pathways = if pathways_structured {
        false
    } else {
        print!("Resolve flat pathway members that are pathway ids? (y/n, default as n):\n>  ");
        matches!(collect_input().as_str(), "y" | "Y")
    };

    print!("Enter the path to an id-mapping table (optional):\n>  ");
    let id_mapping = collect_input();
    let id_mapping = if id_mapping.is_empty() {
        None
    } else {
        Some(id_mapping)
    };

    print!("Enter the total sequenced read count, for the UNMAPPED row (default as 0):\n>  ");
    let total_reads = match collect_input().as_str() {
        "" => 0,
        input => input.parse::<u64>().unwrap_or(0),
    };

    print!("Enter the thread count (default as 1):\n>  ");
    let threads = match collect_input().as_str() {
        "" => 1,
        input => input.parse::<u32>().unwrap_or(1).max(1),
    };

    print!("Spill alignment hits to disk instead of memory? (y/n, default as n):\n>  ");
    let hit_storage = match collect_input().as_str() {
        "y" | "Y" => HitStorageMode::Disk,
        _ => HitStorageMode::Memory,
    };

    print!("Enter the external pruner command (optional):\n>  ");
    let pruner_command = collect_input();
    let pruner_command = if pruner_command.is_empty() {
        None
    } else {
        Some(pruner_command)
    };

    print!("Enter the significance filter command (optional):\n>  ");
    let significance_command = collect_input();
    let significance_command = if significance_command.is_empty() {
        None
    } else {
        Some(significance_command)
    };

    let params = QuantParams {
        reactions_database,
        pathways_database,
        pathways_structured,
        recurse_flat_pathways,
        id_mapping,
        threads,
        total_reads,
        read_length_normalization: false,
        average_read_length: 0,
        hit_storage,
        temp_dir: ".".to_string(),
        pruner_command,
        significance_command,
        significance_probability: 0.9,
        significance_bin: 0,
    };

    if let Err(e) = params.validate() {
        eprintln!("Generated params are not valid: {}", e);
        return;
    }

    print!("Enter the output path for the param file (default as params.json):\n>  ");
    let output = match collect_input().as_str() {
        "" => "params.json".to_string(),
        input => input.to_string(),
    };

    match serde_json::to_string_pretty(&params) {
        Ok(json) => {
            if let Err(e) = std::fs::write(&output, &json) {
                eprintln!("Failed to write {}: {}", output, e);
                println!("{}", json);
            } else {
                println!("Wrote param file to {}", output);
            }
        }
        Err(e) => eprintln!("Failed to serialize params: {}", e),
    }
}

fn collect_input() -> String {
    io::stdout().flush().unwrap();
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .expect("Failed to read line");
    input.trim().to_string()
}
