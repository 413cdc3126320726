use clap::Parser;
use ocean_mapper::JobStore;
use ocean_mapper::cli::{Args, commands};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() {
    let args = Args::parse();

    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        let store = JobStore::new();
        let cancelled = Arc::new(AtomicBool::new(false));

        // First CTRL+C stops queued jobs and lets running ones stop at a
        // stage boundary
        let signal_store = store.clone();
        let signal_flag = Arc::clone(&cancelled);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nReceived CTRL+C, shutting down gracefully...");
                signal_flag.store(true, Ordering::SeqCst);
                signal_store.cancel_pending().await;
            }
        });

        let result = commands::run(args, store.clone(), Arc::clone(&cancelled)).await;
        store.clear().await;

        match result {
            Ok(()) if cancelled.load(Ordering::SeqCst) => {
                Err(anyhow::anyhow!("Processing interrupted by user"))
            }
            other => other,
        }
    });

    match result {
        Ok(()) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("Ocean Mapper - Bathymetric Survey Converter");
    println!("===========================================");
    println!();
    println!("Convert raw sounding files into quality-controlled, gridded");
    println!("bathymetric products with provenance metadata.");
    println!();
    println!("USAGE:");
    println!("    ocean-mapper <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    convert     Convert sounding files into gridded products");
    println!("    overlays    List the registered environmental overlays");
    println!("    inspect     Run quality control on one file and print the report");
    println!();
    println!("EXAMPLES:");
    println!("    # Convert a directory of multibeam files to Parquet:");
    println!("    ocean-mapper convert surveys/ --sensor mbes --output-dir products");
    println!();
    println!("    # Anonymize vessels and write ESRI ASCII grids:");
    println!("    OCEAN_MAPPER_SALT=cruise-42 ocean-mapper convert 'line_*.csv' \\");
    println!("        --sensor sbes --anonymize --format ascii-grid");
    println!();
    println!("    # Inspect one LiDAR file:");
    println!("    ocean-mapper inspect flight_03_lidar.csv");
    println!();
    println!("For detailed help on any command, use:");
    println!("    ocean-mapper <COMMAND> --help");
}
