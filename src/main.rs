// src/main.rs

use std::env;
use std::process::ExitCode;
use std::time::Instant;
use log::info;

use heaptree::engine::{self, parse_count};
use heaptree::error::{IndexError, IndexResult};
use heaptree::storage::heap::HeapFormat;

const USAGE: &str = "usage:\n  \
    heaptree build <heap-file> <index-file> <key-length> [page-size]\n  \
    heaptree query <index-file> <key> [limit]";

fn run(args: &[String]) -> IndexResult<()> {
    let started = Instant::now();
    match args {
        [cmd, heap, index, key_length, rest @ ..] if cmd == "build" && rest.len() <= 1 => {
            let key_length = parse_count("key-length", key_length)?;
            let format = match rest.first() {
                Some(size) => HeapFormat::paged(parse_count("page-size", size)?)?,
                None => HeapFormat::Text,
            };
            let stats = engine::build(heap, index, key_length, format)?;
            println!(
                "Indexed {} of {} records into {} ({} duplicates skipped)",
                stats.inserted, stats.records_read, index, stats.duplicates
            );
        }
        [cmd, index, key, rest @ ..] if cmd == "query" && rest.len() <= 1 => {
            let limit = rest.first().map(|n| parse_count("limit", n)).transpose()?;
            let result = engine::query(index, key, limit)?;
            if !result.found {
                println!("Given key doesn't exist.");
            }
            for hit in result.hits {
                println!("At {}, record: {}", hit.offset, hit.record);
            }
        }
        _ => return Err(IndexError::Usage("wrong number of arguments".into())),
    }
    info!("Time taken: {} ms", started.elapsed().as_millis());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(IndexError::Usage(msg)) => {
            eprintln!("Error: {}\n{}", msg, USAGE);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
