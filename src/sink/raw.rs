//! Unbuffered debug output: one line per measurement as soon as it is
//! decoded.

use std::io::Write;

use super::Sink;
use crate::error::Result;
use crate::vedirect::decoder::Measurement;

pub struct RawSink<W> {
    out: W,
    fahrenheit: bool,
}

impl<W: Write + Send> RawSink<W> {
    pub fn new(out: W, fahrenheit: bool) -> Self {
        Self { out, fahrenheit }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

impl<W: Write + Send> Sink for RawSink<W> {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn measurement(&mut self, m: &Measurement) -> Result<()> {
        writeln!(
            self.out,
            "{}\t{}\t{}",
            m.key(),
            m.description(),
            m.display(self.fahrenheit)
        )?;
        self.out.flush()?;
        Ok(())
    }
}
