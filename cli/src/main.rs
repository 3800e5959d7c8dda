use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use fatmod_core::OpenMode;
use fatmod_filesystems::Fat32Volume;

#[derive(Parser)]
#[command(name = "fatmod")]
#[command(about = "Interactive FAT32 image manipulator", long_about = None)]
struct Cli {
    /// Path to the FAT32 filesystem image
    image: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut volume = match Fat32Volume::mount(&cli.image) {
        Ok(volume) => volume,
        Err(err) => {
            eprintln!("Error setting up file system: {err}");
            std::process::exit(1);
        }
    };

    let image_name = cli.image.display().to_string();
    let stdin = io::stdin();

    loop {
        print!("[{image_name}]> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let tokens = tokenize(line.trim_end());
        if tokens.is_empty() {
            continue;
        }

        match tokens[0].as_str() {
            "exit" => {
                if tokens.len() == 1 {
                    return Ok(());
                }
                println!("Usage: exit");
            }
            "fsinfo" => {
                if tokens.len() == 1 {
                    println!("{}", volume.summary());
                } else {
                    println!("Usage: fsinfo");
                }
            }
            "ls" => match tokens.len() {
                1 => run_ls(&volume, "."),
                2 => run_ls(&volume, &tokens[1]),
                _ => println!("Usage: ls <dir_name>"),
            },
            "cd" => {
                if tokens.len() == 2 {
                    report(volume.cd(&tokens[1]));
                } else {
                    println!("Usage: cd <dir_name>");
                }
            }
            "size" => {
                if tokens.len() == 2 {
                    match volume.allocated_size(&tokens[1]) {
                        Ok(bytes) => {
                            println!("'{}' has {} allocated bytes.", tokens[1], bytes)
                        }
                        Err(err) => println!("Error: {err}"),
                    }
                } else {
                    println!("Usage: size <file_name>");
                }
            }
            "open" => {
                if tokens.len() == 3 {
                    match tokens[2].parse::<OpenMode>() {
                        Ok(mode) => match volume.open(&tokens[1], mode) {
                            Ok(()) => println!(
                                "'{}' has been opened with {} permission.",
                                tokens[1],
                                mode.description()
                            ),
                            Err(err) => println!("Error: {err}"),
                        },
                        Err(err) => println!("Error: {err}"),
                    }
                } else {
                    println!("Usage: open <file_name> <mode>");
                }
            }
            "close" => {
                if tokens.len() == 2 {
                    match volume.close(&tokens[1]) {
                        Ok(()) => println!("'{}' is now closed.", tokens[1]),
                        Err(err) => println!("Error: {err}"),
                    }
                } else {
                    println!("Usage: close <file_name>");
                }
            }
            "read" => {
                if tokens.len() == 4 {
                    match (parse_u32(&tokens[2]), parse_u32(&tokens[3])) {
                        (Some(start), Some(count)) => {
                            match volume.read(&tokens[1], start, count) {
                                Ok(data) => println!("{}", String::from_utf8_lossy(&data)),
                                Err(err) => println!("Error: {err}"),
                            }
                        }
                        _ => println!("Error: start position and byte count must be numbers."),
                    }
                } else {
                    println!("Usage: read <file_name> <start_pos> <num_bytes>");
                }
            }
            "write" => {
                if tokens.len() == 4 {
                    let data = &tokens[3];
                    if !(data.len() >= 2 && data.starts_with('"') && data.ends_with('"')) {
                        println!("Error: data must be quoted.");
                    } else {
                        match parse_u32(&tokens[2]) {
                            Some(start) => {
                                let unquoted = &data[1..data.len() - 1];
                                match volume.write(&tokens[1], start, unquoted.as_bytes()) {
                                    Ok(()) => println!(
                                        "Wrote \"{}\" to {}:{} of length {}",
                                        unquoted,
                                        start,
                                        tokens[1],
                                        unquoted.len()
                                    ),
                                    Err(err) => println!("Error: {err}"),
                                }
                            }
                            None => println!("Error: start position must be a number."),
                        }
                    }
                } else {
                    println!("Usage: write <file_name> <start_pos> <quoted_data>");
                }
            }
            "create" => {
                if tokens.len() == 2 {
                    report(volume.create(&tokens[1]));
                } else {
                    println!("Usage: create <file_name>");
                }
            }
            "rm" => {
                if tokens.len() == 2 {
                    report(volume.remove(&tokens[1]));
                } else {
                    println!("Usage: rm <file_name>");
                }
            }
            "mkdir" => {
                if tokens.len() == 2 {
                    report(volume.mkdir(&tokens[1]));
                } else {
                    println!("Usage: mkdir <directory_name>");
                }
            }
            "rmdir" => {
                if tokens.len() == 2 {
                    report(volume.rmdir(&tokens[1]));
                } else {
                    println!("Usage: rmdir <directory_name>");
                }
            }
            "undelete" => match volume.undelete() {
                Ok(count) => println!("Recovered {count} file(s)."),
                Err(err) => println!("Error: {err}"),
            },
            _ => println!("Invalid command"),
        }
    }
}

fn run_ls(volume: &Fat32Volume, name: &str) {
    match volume.list(name) {
        Ok(names) => println!("{}", names.join(" ")),
        Err(err) => println!("Error: {err}"),
    }
}

fn report(result: Result<(), fatmod_core::FatError>) {
    if let Err(err) = result {
        println!("Error: {err}");
    }
}

fn parse_u32(token: &str) -> Option<u32> {
    token.parse().ok()
}

/// Whitespace tokenizer with double-quote handling: once a quote is seen the
/// rest of the line binds to the current token, so `write` data may contain
/// spaces.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut in_quote = false;

    for ch in input.chars() {
        if ch == '"' {
            in_quote = true;
            token.push(ch);
        } else if ch.is_whitespace() && !in_quote {
            if !token.is_empty() {
                tokens.push(std::mem::take(&mut token));
            }
        } else {
            token.push(ch);
        }
    }
    if !token.is_empty() {
        tokens.push(token);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::tokenize;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(tokenize("ls foo"), vec!["ls", "foo"]);
        assert_eq!(tokenize("  fsinfo  "), vec!["fsinfo"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn quotes_bind_spaces() {
        assert_eq!(
            tokenize("write a.txt 0 \"hello world\""),
            vec!["write", "a.txt", "0", "\"hello world\""]
        );
    }
}
