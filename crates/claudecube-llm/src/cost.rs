//! Cost accounting for LLM calls.
//!
//! Each call appends one JSON object to a date-stamped file
//! (`costs-YYYY-MM-DD.jsonl`). Estimates come from a static pricing table;
//! unknown models cost 0.0. A failed write is logged and swallowed.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::LlmResponse;

/// Per-million-token pricing for one model.
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Maps model ids to pricing.
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "claude-haiku-4-5-20251001".to_string(),
            ModelPricing {
                input_per_million: 1.00,
                output_per_million: 5.00,
            },
        );
        models.insert(
            "claude-sonnet-4-5-20250929".to_string(),
            ModelPricing {
                input_per_million: 3.00,
                output_per_million: 15.00,
            },
        );
        Self { models }
    }
}

impl PricingTable {
    /// Estimated USD cost. Unknown models return 0.0.
    pub fn estimate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        match self.models.get(model) {
            Some(pricing) => {
                let input = (input_tokens as f64 / 1_000_000.0) * pricing.input_per_million;
                let output = (output_tokens as f64 / 1_000_000.0) * pricing.output_per_million;
                input + output
            }
            None => 0.0,
        }
    }
}

/// One recorded API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEntry {
    pub timestamp: String,
    /// What the call was for: `tool-eval`, `reply-eval`, `summary`.
    pub purpose: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// Date-stamped JSONL cost sink.
pub struct CostLog {
    dir: PathBuf,
    pricing: PricingTable,
    write_lock: Mutex<()>,
}

impl CostLog {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            pricing: PricingTable::default(),
            write_lock: Mutex::new(()),
        }
    }

    /// Record one call. Failures are logged, never raised.
    pub fn record(&self, purpose: &str, response: &LlmResponse) {
        let entry = CostEntry {
            timestamp: Utc::now().to_rfc3339(),
            purpose: purpose.to_string(),
            model: response.model.clone(),
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            estimated_cost_usd: self.pricing.estimate_cost(
                &response.model,
                response.input_tokens,
                response.output_tokens,
            ),
        };
        if let Err(e) = self.try_record(&entry) {
            warn!(error = %e, "failed to write cost entry");
        }
    }

    fn try_record(&self, entry: &CostEntry) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating cost dir {}", self.dir.display()))?;
        let path = self.path_for(&Utc::now().format("%Y-%m-%d").to_string());
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        file.flush()?;
        Ok(())
    }

    /// Entries for a `YYYY-MM-DD` date.
    pub fn read_date(&self, date: &str) -> Vec<CostEntry> {
        let file = match File::open(self.path_for(date)) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };
        BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(&l).ok())
            .collect()
    }

    /// Total estimated spend for a date.
    pub fn total_for_date(&self, date: &str) -> f64 {
        self.read_date(date)
            .iter()
            .map(|e| e.estimated_cost_usd)
            .sum()
    }

    fn path_for(&self, date: &str) -> PathBuf {
        self.dir.join(format!("costs-{date}.jsonl"))
    }
}
