//! Command implementations behind the `pkz` binary.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{self, Commands};
use crate::dir_fetcher::PICTURES_FILE;
use crate::model::Archive;
use crate::progress::{ProgressState, ProgressTracker};
use crate::{DirectoryFetcher, PkzReader, WriteOptions};

/// Public entry for running CLI logic.
pub fn run_cli_app() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::run()?;
    tracing_subscriber::fmt()
        .with_max_level(cli::log_level(args.verbose))
        .with_writer(io::stderr)
        .init();

    match &args.command {
        Commands::Pack { input, output, level, plain_index, progress } => {
            let fetcher = DirectoryFetcher::open(input)?;
            let options = WriteOptions { level: *level, plain_index: *plain_index };
            let mut tracker = ProgressTracker::new(Duration::from_millis(100));
            if *progress {
                tracker.enable_with_callback(print_progress);
            }
            let archive = crate::write_archive_file(output, &fetcher, &options, Some(&mut tracker))?;
            println!(
                "Packed {} comics, {} volumes, {} chapters, {} pictures → {}",
                archive.comic_count,
                archive.volumes_count,
                archive.chapter_count,
                archive.picture_count,
                output.display()
            );
        }
        Commands::Info { archive, tree, json } => {
            let index = crate::read_archive_index(archive)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&index)?);
            } else {
                print_summary(&index);
                if *tree {
                    print_tree(&index);
                }
            }
        }
        Commands::Cat { archive, entry, output } => {
            let bytes = crate::read_entry(archive, entry)?;
            match output {
                Some(path) => fs::write(path, &bytes)?,
                None => io::stdout().lock().write_all(&bytes)?,
            }
        }
        Commands::Verify { archive } => {
            let mut reader = PkzReader::open(archive)?;
            let index = reader.index()?;
            let report = reader.verify(&index);
            for issue in &report.count_issues {
                println!("count mismatch: {}", issue);
            }
            for name in &report.missing_entries {
                println!("missing entry: {}", name);
            }
            for (name, err) in &report.unreadable_entries {
                println!("unreadable entry: {} ({})", name, err);
            }
            for name in &report.orphan_entries {
                println!("unreferenced entry: {}", name);
            }
            if !report.is_ok() {
                return Err(format!("{} failed verification", archive.display()).into());
            }
            println!("OK: {} entries, {} pictures", reader.len(), index.picture_count);
        }
        Commands::Extract { archive, output } => {
            let written = extract_tree(archive, output)?;
            println!("Extracted {} assets → {}", written, output.display());
        }
    }

    Ok(())
}

fn print_summary(index: &Archive) {
    println!("Name:        {}", index.info.name);
    println!("Author:      {}", index.info.author);
    if !index.info.description.is_empty() {
        println!("Description: {}", index.info.description);
    }
    println!(
        "Contents:    {} comics, {} volumes, {} chapters, {} pictures",
        index.comic_count, index.volumes_count, index.chapter_count, index.picture_count
    );
}

fn print_tree(index: &Archive) {
    for comic in &index.comics {
        println!("[{}] {} ({} pictures)", comic.idx, comic.info.title, comic.picture_count);
        for volume in &comic.volumes {
            println!("  [{}] {}", volume.idx, volume.info.title);
            for chapter in &volume.chapters {
                println!("    [{}] {} ({} pictures)", chapter.idx, chapter.info.title, chapter.picture_count);
                for picture in &chapter.pictures {
                    println!(
                        "      [{}] {} {}x{} {} -> {}",
                        picture.idx,
                        picture.info.title,
                        picture.info.width,
                        picture.info.height,
                        picture.info.format,
                        picture.picture_path
                    );
                }
            }
        }
    }
}

/// Writes every asset of `archive` under `out_root` in the layout `DirectoryFetcher` reads,
/// including the `*.json` metadata files and a `pictures.json` per chapter, so packing
/// the tree again restores the same metadata. Pictures without stored bytes are
/// left out. Returns the number of assets written.
pub fn extract_tree(archive: &Path, out_root: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let mut reader = PkzReader::open(archive)?;
    let index = reader.index()?;
    let mut written = 0usize;

    fs::create_dir_all(out_root)?;
    write_json(&out_root.join("archive.json"), &index.info)?;
    written += extract_asset(&mut reader, &index.cover_path, out_root, "cover")?;
    written += extract_asset(&mut reader, &index.author_avatar_path, out_root, "avatar")?;

    for comic in &index.comics {
        let comic_dir = out_root.join(node_dir_name(comic.idx, &comic.info.title));
        fs::create_dir_all(&comic_dir)?;
        write_json(&comic_dir.join("comic.json"), &comic.info)?;
        written += extract_asset(&mut reader, &comic.cover_path, &comic_dir, "cover")?;
        written += extract_asset(&mut reader, &comic.author_avatar_path, &comic_dir, "avatar")?;

        for volume in &comic.volumes {
            let volume_dir = comic_dir.join(node_dir_name(volume.idx, &volume.info.title));
            fs::create_dir_all(&volume_dir)?;
            write_json(&volume_dir.join("volume.json"), &volume.info)?;
            written += extract_asset(&mut reader, &volume.cover_path, &volume_dir, "cover")?;

            for chapter in &volume.chapters {
                let chapter_dir = volume_dir.join(node_dir_name(chapter.idx, &chapter.info.title));
                fs::create_dir_all(&chapter_dir)?;
                write_json(&chapter_dir.join("chapter.json"), &chapter.info)?;
                written += extract_asset(&mut reader, &chapter.cover_path, &chapter_dir, "cover")?;

                let mut picture_infos = Vec::with_capacity(chapter.pictures.len());
                for picture in &chapter.pictures {
                    if picture.picture_path.is_empty() {
                        continue;
                    }
                    let bytes = reader.read_entry(&picture.picture_path)?;
                    let ext = if picture.info.format.is_empty() {
                        guess_extension(&bytes)
                    } else {
                        sanitize(&picture.info.format)
                    };
                    let target = chapter_dir.join(format!("{:04}.{}", picture.idx + 1, ext));
                    fs::write(&target, &bytes)?;
                    tracing::debug!(target = %target.display(), "picture extracted");
                    picture_infos.push(&picture.info);
                    written += 1;
                }
                write_json(&chapter_dir.join(PICTURES_FILE), &picture_infos)?;
            }
        }
    }
    Ok(written)
}

fn extract_asset<R: io::Read + io::Seek>(
    reader: &mut PkzReader<R>,
    entry: &str,
    dir: &Path,
    stem: &str,
) -> Result<usize, Box<dyn std::error::Error>> {
    if entry.is_empty() {
        return Ok(0);
    }
    let bytes = reader.read_entry(entry)?;
    let target: PathBuf = dir.join(format!("{}.{}", stem, guess_extension(&bytes)));
    fs::write(&target, &bytes)?;
    Ok(1)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

fn guess_extension(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("bin")
        .to_string()
}

/// `NNN title`, so directories sort in stored order.
fn node_dir_name(idx: usize, title: &str) -> String {
    let title = sanitize(title);
    if title.is_empty() {
        format!("{:03}", idx + 1)
    } else {
        format!("{:03} {}", idx + 1, title)
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control() { '_' } else { c })
        .collect::<String>()
        .trim()
        .trim_matches('.')
        .to_string()
}

// --- utils for CLI progress -------------------------------------------------

fn print_progress(state: ProgressState) {
    let bar_width: usize = 30;
    let filled = ((state.progress_percent / 100.0) * bar_width as f32) as usize;
    let empty = bar_width.saturating_sub(filled);
    let line = format!(
        "[PACK] [{}{}] {:.1}% | {}/{} comics | {} pictures | {:.1} MB/s | ratio {:.2}",
        "█".repeat(filled),
        "░".repeat(empty),
        state.progress_percent,
        state.completed_comics,
        state.total_comics,
        state.pictures_written,
        state.speed_mbps,
        state.ratio(),
    );
    // Print to stderr to avoid interfering with stdout
    eprint!("\r\x1B[2K{}", line);
    io::stderr().flush().ok();
    if state.progress_percent >= 100.0 {
        eprintln!();
    }
}
