use std::io::{self, Write};

use serde::Serialize;

use crate::ingest::{IngestReceipt, MappedDeposit};
use crate::validator::ValidationVerdict;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_receipt(receipt: &IngestReceipt) -> io::Result<()> {
        Self::print_json(receipt)
    }

    pub fn print_verdict(verdict: &ValidationVerdict) -> io::Result<()> {
        Self::print_json(verdict)
    }

    pub fn print_mapping(mapping: &MappedDeposit) -> io::Result<()> {
        Self::print_json(mapping)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
