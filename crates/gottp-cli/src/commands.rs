// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library-level command implementations for the `gottp` CLI (§6.3).
//!
//! Kept separate from `main.rs` so each subcommand's behavior can be tested
//! without spawning the binary.

use anyhow::{bail, Context, Result};
use gottp_codecs::{curl, har, insomnia, openapi, postman, ParseOutcome};
use gottp_collection::Collection;
use gottp_detect::Format;
use std::path::Path;

/// Which interchange format an `import`/`export` call targets. Mirrors
/// [`gottp_detect::Format`] but excludes `Unknown`, which is never a valid
/// explicit `--format` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFormat {
    /// A single `curl` command line.
    Curl,
    /// HAR 1.2 log.
    Har,
    /// Postman v2.1 collection.
    Postman,
    /// Insomnia v4 export.
    Insomnia,
    /// OpenAPI 3.x document (import-only, per §4.6).
    OpenApi,
}

impl CodecFormat {
    /// Parse a `--format` flag value.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "curl" => Ok(Self::Curl),
            "har" => Ok(Self::Har),
            "postman" => Ok(Self::Postman),
            "insomnia" => Ok(Self::Insomnia),
            "openapi" => Ok(Self::OpenApi),
            other => bail!("unknown format `{other}` (expected curl, har, postman, insomnia, or openapi)"),
        }
    }

    fn from_detected(format: Format) -> Result<Self> {
        match format {
            Format::Curl => Ok(Self::Curl),
            Format::Har => Ok(Self::Har),
            Format::Postman => Ok(Self::Postman),
            Format::Insomnia => Ok(Self::Insomnia),
            Format::OpenApi => Ok(Self::OpenApi),
            Format::Unknown => bail!("could not detect input format; pass --format explicitly"),
        }
    }
}

/// Read `path`, or stdin when `path == "-"` (§6.3's `import <file|->`).
pub fn read_input(path: &str) -> Result<Vec<u8>> {
    if path == "-" {
        use std::io::Read;
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf).context("read stdin")?;
        Ok(buf)
    } else {
        std::fs::read(path).with_context(|| format!("read input file '{path}'"))
    }
}

/// Parse `bytes` into a [`Collection`], using `format` when given or
/// auto-detecting it via [`gottp_detect::detect`] otherwise (§4.7).
///
/// Returns the parsed collection plus any non-fatal codec warnings.
pub fn import_bytes(bytes: &[u8], format: Option<CodecFormat>) -> Result<ParseOutcome<Collection>> {
    let format = match format {
        Some(f) => f,
        None => CodecFormat::from_detected(gottp_detect::detect(bytes))?,
    };

    let outcome = match format {
        CodecFormat::Curl => curl::parse(bytes)?,
        CodecFormat::Har => har::parse(bytes)?,
        CodecFormat::Postman => postman::parse(bytes)?,
        CodecFormat::Insomnia => insomnia::parse(bytes)?,
        CodecFormat::OpenApi => openapi::parse(bytes)?,
    };
    Ok(outcome)
}

/// Write `collection` as `.gottp.yaml` to `output`, or print it to stdout
/// when `output` is `None`.
pub fn write_collection(collection: &Collection, output: Option<&Path>) -> Result<()> {
    let yaml = serde_yaml::to_string(collection).context("serialize collection to YAML")?;
    match output {
        Some(path) => {
            gottp_collection::save(collection, path).with_context(|| format!("save collection to '{}'", path.display()))?;
        }
        None => print!("{yaml}"),
    }
    Ok(())
}

/// Export a single [`gottp_collection::Request`] as a multi-line `curl`
/// command (§4.6).
pub fn export_curl(request: &gottp_collection::Request) -> Result<String> {
    Ok(curl::export(request)?)
}

/// Export `collection` as a Postman v2.1 document.
pub fn export_postman(collection: &Collection) -> Result<Vec<u8>> {
    Ok(postman::export(collection)?)
}

/// Export `collection` as an Insomnia v4 document.
pub fn export_insomnia(collection: &Collection) -> Result<Vec<u8>> {
    Ok(insomnia::export(collection)?)
}

/// Validate a `.gottp.yaml` collection file, returning a list of
/// human-readable problems (empty when the file is valid).
pub fn validate_file(path: &Path) -> Result<Vec<String>> {
    let collection = match gottp_collection::load(path) {
        Ok(c) => c,
        Err(e) => return Ok(vec![e.to_string()]),
    };

    let mut problems = Vec::new();
    if let Err(e) = collection.validate() {
        problems.push(e.to_string());
    }
    Ok(problems)
}

/// Re-serialize a loaded collection to its canonical YAML form (stable key
/// order, defaulted version, assigned ids — §4.1's save guarantees).
pub fn canonical_yaml(path: &Path) -> Result<String> {
    let collection = gottp_collection::load(path)?;
    Ok(serde_yaml::to_string(&collection)?)
}

/// Initialize a new, minimal collection file at `output` (`init`, §6.3).
/// Fails with `Conflict` semantics (a plain error here; the binary maps it
/// to exit code 1) if the file already exists.
pub fn init_collection(name: &str, output: &Path, with_env: bool) -> Result<()> {
    if output.exists() {
        bail!("'{}' already exists", output.display());
    }
    let mut collection = Collection::new(name);
    collection.items.push(gottp_collection::Item::Request(gottp_collection::Request::new(
        "Example",
        "GET",
        "https://example.com",
    )));
    gottp_collection::save(&collection, output).with_context(|| format!("write collection to '{}'", output.display()))?;

    if with_env {
        let env_path = output.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new(".")).join("environments.yaml");
        let mut file = gottp_collection::EnvironmentsFile::default();
        let mut env = gottp_collection::Environment::new("default");
        env.variables.insert("base_url".to_string(), gottp_collection::EnvironmentValue::new("https://example.com"));
        file.environments.push(env);
        let yaml = serde_yaml::to_string(&file).context("serialize environments file")?;
        std::fs::write(&env_path, yaml).with_context(|| format!("write environments file to '{}'", env_path.display()))?;
    }
    Ok(())
}
