use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use mu_shelf::{
    ArchiveReader, Chapter, Document, DocumentMetadata, OpenOptionsBuilder, ShelfError, TocEntry,
};

#[derive(Clone, Debug)]
enum Json {
    Null,
    Bool(bool),
    Num(usize),
    Str(String),
    Arr(Vec<Json>),
    Obj(Vec<(String, Json)>),
}

impl Json {
    fn render(&self, pretty: bool) -> String {
        let mut out = String::new();
        self.write_into(&mut out, pretty, 0);
        out
    }

    fn write_into(&self, out: &mut String, pretty: bool, depth: usize) {
        match self {
            Json::Null => out.push_str("null"),
            Json::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            Json::Num(v) => out.push_str(&v.to_string()),
            Json::Str(v) => write_json_string(out, v),
            Json::Arr(items) => {
                out.push('[');
                if !items.is_empty() && pretty {
                    out.push('\n');
                }
                for (idx, item) in items.iter().enumerate() {
                    if pretty {
                        write_indent(out, depth + 1);
                    }
                    item.write_into(out, pretty, depth + 1);
                    if idx + 1 != items.len() {
                        out.push(',');
                    }
                    if pretty {
                        out.push('\n');
                    }
                }
                if !items.is_empty() && pretty {
                    write_indent(out, depth);
                }
                out.push(']');
            }
            Json::Obj(fields) => {
                out.push('{');
                if !fields.is_empty() && pretty {
                    out.push('\n');
                }
                for (idx, (key, value)) in fields.iter().enumerate() {
                    if pretty {
                        write_indent(out, depth + 1);
                    }
                    write_json_string(out, key);
                    out.push(':');
                    if pretty {
                        out.push(' ');
                    }
                    value.write_into(out, pretty, depth + 1);
                    if idx + 1 != fields.len() {
                        out.push(',');
                    }
                    if pretty {
                        out.push('\n');
                    }
                }
                if !fields.is_empty() && pretty {
                    write_indent(out, depth);
                }
                out.push('}');
            }
        }
    }
}

fn write_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn write_json_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c <= '\u{1f}' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn opt_str(value: Option<&str>) -> Json {
    value.map_or(Json::Null, |v| Json::Str(v.to_string()))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let mut rest = args.into_iter().skip(1).collect::<Vec<_>>();
    let pretty = pop_flag(&mut rest, "--pretty");
    let scratch_dir = pop_value(&mut rest, "--scratch-dir")?;
    let tool_timeout = pop_value(&mut rest, "--tool-timeout")?
        .map(|v| {
            v.parse::<u64>()
                .map_err(|_| format!("invalid --tool-timeout value '{}'", v))
        })
        .transpose()?;

    if rest.is_empty() || rest[0] == "--help" || rest[0] == "-h" {
        print_help();
        return Ok(());
    }

    let mut builder = OpenOptionsBuilder::new();
    if let Some(dir) = scratch_dir {
        builder = builder.scratch_root(dir);
    }
    if let Some(secs) = tool_timeout {
        builder = builder.tool_timeout(Duration::from_secs(secs));
    }

    let cmd = rest.remove(0);
    match cmd.as_str() {
        "open" => {
            let path = first_arg(&rest, "open requires <path>")?;
            let doc = builder.open(&path).map_err(display_err)?;
            let output = Json::Obj(vec![
                ("path".to_string(), Json::Str(path)),
                ("title".to_string(), Json::Str(doc.title().to_string())),
                (
                    "kind".to_string(),
                    Json::Str(if doc.is_text() { "text" } else { "images" }.to_string()),
                ),
                ("chapter_count".to_string(), Json::Num(doc.chapters().len())),
                ("image_count".to_string(), Json::Num(doc.image_paths().len())),
                ("metadata".to_string(), metadata_json(doc.metadata())),
            ]);
            println!("{}", output.render(pretty));
        }
        "chapters" => {
            let mut args = rest;
            let ndjson = pop_flag(&mut args, "--ndjson");
            let path = first_arg(&args, "chapters requires <path>")?;
            let doc = builder.open(&path).map_err(display_err)?;
            if ndjson {
                for (index, chapter) in doc.chapters().iter().enumerate() {
                    println!("{}", chapter_json(index, chapter).render(false));
                }
            } else {
                let output = Json::Obj(vec![
                    ("path".to_string(), Json::Str(path)),
                    ("count".to_string(), Json::Num(doc.chapters().len())),
                    (
                        "chapters".to_string(),
                        Json::Arr(
                            doc.chapters()
                                .iter()
                                .enumerate()
                                .map(|(i, c)| chapter_json(i, c))
                                .collect(),
                        ),
                    ),
                ]);
                println!("{}", output.render(pretty));
            }
        }
        "text" => {
            let mut args = rest;
            let raw = pop_flag(&mut args, "--raw");
            let index = pop_value(&mut args, "--index")?
                .map(|v| {
                    v.parse::<usize>()
                        .map_err(|_| format!("invalid --index value '{}'", v))
                })
                .transpose()?;
            let path = first_arg(&args, "text requires <path>")?;
            let doc = builder.open(&path).map_err(display_err)?;
            let text = select_text(&doc, index)?;
            if raw {
                print!("{}", text);
            } else {
                let output = Json::Obj(vec![
                    ("path".to_string(), Json::Str(path)),
                    (
                        "index".to_string(),
                        index.map_or(Json::Null, Json::Num),
                    ),
                    ("text".to_string(), Json::Str(text.to_string())),
                ]);
                println!("{}", output.render(pretty));
            }
        }
        "toc" => {
            let path = first_arg(&rest, "toc requires <path>")?;
            let doc = builder.open(&path).map_err(display_err)?;
            let output = Json::Obj(vec![
                ("path".to_string(), Json::Str(path)),
                (
                    "toc".to_string(),
                    Json::Arr(doc.toc().iter().map(toc_json).collect()),
                ),
            ]);
            println!("{}", output.render(pretty));
        }
        "images" => {
            let path = first_arg(&rest, "images requires <path>")?;
            let doc = builder.open(&path).map_err(display_err)?;
            let output = Json::Obj(vec![
                ("path".to_string(), Json::Str(path)),
                ("count".to_string(), Json::Num(doc.image_paths().len())),
                (
                    "images".to_string(),
                    Json::Arr(
                        doc.image_paths()
                            .iter()
                            .map(|p| Json::Str(p.display().to_string()))
                            .collect(),
                    ),
                ),
            ]);
            println!("{}", output.render(pretty));
        }
        "entries" => {
            let path = first_arg(&rest, "entries requires <path>")?;
            let archive = ArchiveReader::open(Path::new(&path)).map_err(display_err)?;
            let entries = archive
                .list_entries()
                .into_iter()
                .map(|entry| {
                    Json::Obj(vec![
                        ("name".to_string(), Json::Str(entry.name)),
                        ("size".to_string(), Json::Num(entry.size as usize)),
                    ])
                })
                .collect::<Vec<_>>();
            let output = Json::Obj(vec![
                ("path".to_string(), Json::Str(path)),
                ("count".to_string(), Json::Num(entries.len())),
                ("entries".to_string(), Json::Arr(entries)),
            ]);
            println!("{}", output.render(pretty));
        }
        _ => {
            return Err(format!(
                "unknown command '{}'; run `mu-shelf --help` for usage",
                cmd
            ));
        }
    }

    Ok(())
}

fn select_text(doc: &Document, index: Option<usize>) -> Result<&str, String> {
    match index {
        None => Ok(doc.full_text()),
        Some(i) => doc
            .chapters()
            .get(i)
            .map(|c| c.text.as_str())
            .ok_or_else(|| format!("chapter index {} out of range ({} chapters)", i, doc.chapters().len())),
    }
}

fn first_arg(args: &[String], msg: &str) -> Result<String, String> {
    args.first().cloned().ok_or_else(|| msg.to_string())
}

fn pop_flag(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(pos) = args.iter().position(|a| a == flag) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn pop_value(args: &mut Vec<String>, flag: &str) -> Result<Option<String>, String> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        return Err(format!("{} requires a value", flag));
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn chapter_json(index: usize, chapter: &Chapter) -> Json {
    Json::Obj(vec![
        ("index".to_string(), Json::Num(index)),
        ("title".to_string(), Json::Str(chapter.title.clone())),
        ("href".to_string(), Json::Str(chapter.href.clone())),
        ("chars".to_string(), Json::Num(chapter.text.chars().count())),
    ])
}

fn toc_json(entry: &TocEntry) -> Json {
    Json::Obj(vec![
        ("label".to_string(), Json::Str(entry.label.clone())),
        ("href".to_string(), Json::Str(entry.href.clone())),
        (
            "chapter_index".to_string(),
            entry.chapter_index.map_or(Json::Null, Json::Num),
        ),
    ])
}

fn metadata_json(metadata: &DocumentMetadata) -> Json {
    Json::Obj(vec![
        (
            "authors".to_string(),
            Json::Arr(
                metadata
                    .authors
                    .iter()
                    .map(|a| Json::Str(a.clone()))
                    .collect(),
            ),
        ),
        ("language".to_string(), opt_str(metadata.language.as_deref())),
        ("publisher".to_string(), opt_str(metadata.publisher.as_deref())),
        (
            "description".to_string(),
            opt_str(metadata.description.as_deref()),
        ),
        ("series".to_string(), opt_str(metadata.series.as_deref())),
        (
            "cover_path".to_string(),
            metadata
                .cover_path
                .as_ref()
                .map_or(Json::Null, |p| Json::Str(p.display().to_string())),
        ),
        (
            "has_cover".to_string(),
            Json::Bool(metadata.cover_path.is_some()),
        ),
    ])
}

fn display_err(err: ShelfError) -> String {
    err.to_string()
}

fn print_help() {
    let help = r#"mu-shelf - inspect comic archives and EPUB books

USAGE:
  mu-shelf [--pretty] [--scratch-dir <dir>] [--tool-timeout <secs>] <command> [args...]

COMMANDS:
  open <path>
  chapters <path> [--ndjson]
  text <path> [--index <n>] [--raw]
  toc <path>
  images <path>
  entries <archive_path>

NOTES:
  - Supported formats: .cbz, .cbr, .epub
  - Output is JSON by default.
  - `text` without --index prints the full text.
  - CBR files need bsdtar, unrar or unar on PATH.
  - Set RUST_LOG=debug for progress logging.
"#;
    println!("{}", help);
}
