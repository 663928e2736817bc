use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use thiserror::Error;

use crate::instructions::instructions::{DecodeError, Instr, Program};

#[derive(Debug, Error)]
pub(crate) enum LoadError {
    #[error("failed to open '{path}': {source}")]
    NotFoundError {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read trace: {0}")]
    ReadError(#[from] io::Error),
    #[error("line {line}: expected '<hex address> <op_code> <dest_reg> <src_reg0> <src_reg1>', found '{text}'")]
    ParseError { line: usize, text: String },
    #[error("line {line}: {source}")]
    AnalysisError {
        line: usize,
        #[source]
        source: DecodeError,
    },
}

// <hex address> <op_code> <dest_reg> <src_reg0> <src_reg1>
fn trace_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:0[xX])?([0-9a-fA-F]+)\s+(-?\d+)\s+(-?\d+)\s+(-?\d+)\s+(-?\d+)\s*$").unwrap()
    })
}

struct Loader {
    code: Vec<Instr>,
    line: usize,
}

impl Loader {
    fn load<R: BufRead>(&mut self, reader: R) -> Result<(), LoadError> {
        for line in reader.lines() {
            let line = line?;
            self.line += 1;

            if let Some(instr) = self.parse_line(&line)? {
                self.code.push(instr);
            }
        }
        Ok(())
    }

    fn parse_line(&self, text: &str) -> Result<Option<Instr>, LoadError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let captures = trace_line_regex()
            .captures(text)
            .ok_or_else(|| self.parse_error(text))?;

        let addr = u32::from_str_radix(&captures[1], 16).map_err(|_| self.parse_error(text))?;
        let mut fields = [0i32; 4];
        for (k, field) in fields.iter_mut().enumerate() {
            *field = captures[k + 2].parse().map_err(|_| self.parse_error(text))?;
        }

        let [op_code, sink, src0, src1] = fields;
        Instr::decode(addr, op_code, sink, [src0, src1])
            .map(Some)
            .map_err(|source| LoadError::AnalysisError { line: self.line, source })
    }

    fn parse_error(&self, text: &str) -> LoadError {
        LoadError::ParseError { line: self.line, text: text.trim().to_string() }
    }
}

pub(crate) fn load_from_reader<R: BufRead>(reader: R) -> Result<Program, LoadError> {
    let mut loader = Loader { code: Vec::new(), line: 0 };
    loader.load(reader)?;
    debug!("Loaded {} instructions from {} lines", loader.code.len(), loader.line);
    Ok(Program::new(loader.code))
}

pub(crate) fn load_from_string(src: &str) -> Result<Program, LoadError> {
    load_from_reader(src.as_bytes())
}

/// Loads the trace at `path`, or from stdin when there is no path.
pub(crate) fn load(path: Option<&Path>) -> Result<Program, LoadError> {
    match path {
        Some(path) => {
            let file = File::open(path).map_err(|source| LoadError::NotFoundError {
                path: path.display().to_string(),
                source,
            })?;
            load_from_reader(BufReader::new(file))
        }
        None => load_from_reader(io::stdin().lock()),
    }
}

#[cfg(test)]
mod tests {
    use crate::instructions::instructions::FuClass;

    use super::*;

    #[test]
    fn test_load() {
        let src = "\
ab120024 0 1 2 3
0xab120028 1 -1 1 -1

ab12002c -1 4 -1 -1
";
        let program = load_from_string(src).unwrap();
        assert_eq!(program.len(), 3);

        let first = program.code[0];
        assert_eq!(first.addr, 0xab120024);
        assert_eq!(first.class, FuClass::K0);
        assert_eq!(first.sink, Some(1));
        assert_eq!(first.source, [Some(2), Some(3)]);

        let second = program.code[1];
        assert_eq!(second.addr, 0xab120028);
        assert_eq!(second.sink, None);
        assert_eq!(second.source, [Some(1), None]);

        assert_eq!(program.code[2].class, FuClass::K1);
    }

    #[test]
    fn test_load_empty() {
        let program = load_from_string("").unwrap();
        assert_eq!(program.len(), 0);
    }

    #[test]
    fn test_parse_error() {
        let src = "\
ab120024 0 1 2 3
ab120028 1 2
";
        match load_from_string(src) {
            Err(LoadError::ParseError { line, text }) => {
                assert_eq!(line, 2);
                assert_eq!(text, "ab120028 1 2");
            }
            other => panic!("expected a parse error, found {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_analysis_error() {
        let src = "ab120024 7 1 2 3\n";
        match load_from_string(src) {
            Err(LoadError::AnalysisError { line, source }) => {
                assert_eq!(line, 1);
                assert_eq!(source, DecodeError::OpCode(7));
            }
            other => panic!("expected an analysis error, found {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_not_found() {
        let result = load(Some(Path::new("/nonexistent/trace/file.trace")));
        assert!(matches!(result, Err(LoadError::NotFoundError { .. })));
    }
}
