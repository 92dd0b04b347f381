//! 結果ファイルの入出力（gzip 対応）
//!
//! 対応する結果ファイル: `.json` / `.jsonl` / `.csv`（それぞれ `.gz` 圧縮可）。
//! ディレクトリを渡した場合は直下のファイルをパス順に読み、拡張子が合わない
//! ファイルは読み飛ばす。

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use benchstat_core::schema::{parse_csv, parse_json, parse_jsonl};
use benchstat_core::{BenchmarkRecord, NormalizeOptions};

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB

pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    if p.to_string_lossy() == "-" {
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, io::stdin())));
    }
    let f = File::open(p)?;
    if is_gz(p) {
        let dec = flate2::read::GzDecoder::new(f);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)));
    }
    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, f)))
}

/// ファイル全体を文字列として読む（`.gz` は展開する）。
pub fn read_to_string<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let mut text = String::new();
    open_reader(path)?.read_to_string(&mut text)?;
    Ok(text)
}

/// Writer wrapper to propagate finish/close errors for compressed outputs.
#[must_use = "call .close() to propagate compression/IO errors"]
pub enum Writer {
    Plain(BufWriter<File>),
    Stdout(std::io::Stdout),
    Gz(flate2::write::GzEncoder<File>),
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Plain(f) => f.write(buf),
            Writer::Stdout(s) => s.write(buf),
            Writer::Gz(e) => e.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => f.flush(),
            Writer::Stdout(s) => s.flush(),
            Writer::Gz(e) => e.flush(),
        }
    }
}

impl Writer {
    /// Finalize the stream and flush underlying file/stdout.
    pub fn close(self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => {
                let mut file = f.into_inner().map_err(|e| e.into_error())?;
                file.flush()
            }
            Writer::Stdout(mut s) => s.flush(),
            Writer::Gz(e) => {
                let mut f = e.finish()?;
                f.flush()
            }
        }
    }
}

/// `-` は標準出力。親ディレクトリがなければ作る。
pub fn open_writer<P: AsRef<Path>>(path: P) -> io::Result<Writer> {
    let p = path.as_ref();
    if p.to_string_lossy() == "-" {
        return Ok(Writer::Stdout(std::io::stdout()));
    }
    if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let f = File::create(p)?;
    if is_gz(p) {
        let enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        return Ok(Writer::Gz(enc));
    }
    Ok(Writer::Plain(BufWriter::new(f)))
}

fn is_gz(p: &Path) -> bool {
    p.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

/// 結果ファイルの形式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultFormat {
    Json,
    Jsonl,
    Csv,
}

impl ResultFormat {
    /// `.gz` を除いた拡張子で判定する。
    pub fn from_path(path: &Path) -> Option<Self> {
        let inner = if is_gz(path) { path.file_stem().map(Path::new)? } else { path };
        let ext = inner.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "jsonl" => Some(Self::Jsonl),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// 1 ファイルを読み込んで正規化する。スキーマ不一致はファイル全体のエラー。
pub fn load_results_file(path: &Path, opts: &NormalizeOptions) -> Result<Vec<BenchmarkRecord>> {
    let format = ResultFormat::from_path(path)
        .with_context(|| format!("unsupported result file: {}", path.display()))?;
    let text =
        read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let source = path.display().to_string();
    let records = match format {
        ResultFormat::Json => parse_json(&text, &source, opts),
        ResultFormat::Jsonl => parse_jsonl(&text, &source, opts),
        ResultFormat::Csv => parse_csv(&text, &source, opts),
    }
    .with_context(|| format!("failed to load {}", path.display()))?;
    log::debug!("{}: {} records", path.display(), records.len());
    Ok(records)
}

/// ディレクトリ直下の結果ファイルをパス順に読み込む。
pub fn load_results_dir(dir: &Path, opts: &NormalizeOptions) -> Result<Vec<BenchmarkRecord>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut records = Vec::new();
    for path in paths {
        if ResultFormat::from_path(&path).is_none() {
            log::debug!("skipping {} (not a result file)", path.display());
            continue;
        }
        records.extend(load_results_file(&path, opts)?);
    }
    Ok(records)
}

/// ファイルとディレクトリが混在した入力を順に読み込む。
pub fn load_results(inputs: &[PathBuf], opts: &NormalizeOptions) -> Result<Vec<BenchmarkRecord>> {
    let mut records = Vec::new();
    for input in inputs {
        if input.is_dir() {
            records.extend(load_results_dir(input, opts)?);
        } else {
            records.extend(load_results_file(input, opts)?);
        }
    }
    log::info!("loaded {} records from {} input(s)", records.len(), inputs.len());
    Ok(records)
}
