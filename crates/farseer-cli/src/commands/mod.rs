use std::fmt;

pub mod check;
pub mod run;

/// What a finished command reports back to the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSummary {
    pub headline: String,
    pub details: Vec<String>,
}

impl CommandSummary {
    pub fn new(headline: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            details: Vec::new(),
        }
    }

    pub fn detail(mut self, line: impl Into<String>) -> Self {
        self.details.push(line.into());
        self
    }
}

impl fmt::Display for CommandSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "✅ {}", self.headline)?;
        for line in &self.details {
            write!(f, "\n   {line}")?;
        }
        Ok(())
    }
}
