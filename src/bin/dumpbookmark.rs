// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use {
    apple_alias::{
        bookmark::BookmarkHeader,
        toc::{self, Toc},
        AliasRecord, BookmarkData, Result,
    },
    clap::{value_parser, Arg, ArgAction, Command},
    std::path::PathBuf,
};

fn main_impl() -> Result<()> {
    let matches = Command::new("Apple Alias Dumper")
        .arg_required_else_help(true)
        .version("0.1")
        .about("Show information about macOS bookmark and alias record files")
        .arg(
            Arg::new("path")
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .num_args(1)
                .help("Path to a bookmark or alias record file"),
        )
        .arg(
            Arg::new("action")
                .action(ArgAction::Set)
                .value_parser(["header", "toc", "bookmark", "alias-record"])
                .default_value("bookmark")
                .help("Which content to show"),
        )
        .get_matches();

    let path = matches
        .get_one::<PathBuf>("path")
        .expect("path should be required");
    let action = matches
        .get_one::<String>("action")
        .expect("action should be required");

    let data = std::fs::read(path)?;

    match action.as_str() {
        "header" => {
            println!("{:#?}", BookmarkHeader::parse(&data)?);
        }
        "toc" => {
            let header = BookmarkHeader::parse(&data)?;
            let entries = Toc::parse(&data, header.toc_position()?)?;
            println!("{} entries", entries.len());
            for (key, stored) in entries {
                println!(
                    "{key:#06x} -> body offset {} (stored {})",
                    toc::body_offset(stored)?,
                    stored
                );
            }
        }
        "bookmark" => {
            let bookmark = BookmarkData::parse(&data)?;
            println!("{bookmark:#?}");
            println!("target path: {}", bookmark.target_path());
        }
        "alias-record" => {
            let record = AliasRecord::parse(&data)?;
            println!("{record:#?}");
        }
        _ => unreachable!("clap restricts the action values"),
    }

    Ok(())
}

fn main() {
    env_logger::init();

    let exit_code = match main_impl() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {err}");
            1
        }
    };

    std::process::exit(exit_code)
}
