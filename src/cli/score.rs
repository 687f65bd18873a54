//! Score command implementation

use super::OutputFormat;
use crate::app::App;
use crate::config::Config;
use crate::features::synthetic_vector;
use crate::scoring::{ScoredResult, ScoringEngine};
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Number of assets to score, by market cap
    #[arg(short, long, default_value = "25")]
    pub limit: u32,

    /// Derive features from the asset hash instead of querying fusion adapters
    #[arg(long)]
    pub synthetic_features: bool,

    /// Print every feature contribution
    #[arg(long)]
    pub explain: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

impl ScoreArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let scoring = config.scoring.clone();
        let app = App::build(config)?;
        let snapshots = app.source.fetch_universe(1, self.limit.max(1), true).await?;

        let mut results = if self.synthetic_features {
            let vectors: Vec<_> = snapshots.iter().map(synthetic_vector).collect();
            ScoringEngine::new(scoring).score_batch(&vectors)
        } else {
            app.pipeline.score_snapshots(&snapshots, Utc::now()).await
        };
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        if !self.explain {
            results = results.iter().map(ScoredResult::without_explanation).collect();
        }

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
            OutputFormat::Table => print!("{}", format_results(&results, self.explain)),
        }
        Ok(())
    }
}

/// Render results as a ranked table
pub fn format_results(results: &[ScoredResult], explain: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:>4}  {:<8} {:>14} {:>8} {:>7} {:>6}  {}\n",
        "#", "SYMBOL", "PRICE", "24H %", "SCORE", "CONF", "TOP FEATURES"
    ));
    out.push_str(&format!("{}\n", "─".repeat(78)));

    for (index, r) in results.iter().enumerate() {
        let top: Vec<&str> = r.top_features.iter().map(|c| c.feature.as_str()).collect();
        out.push_str(&format!(
            "{:>4}  {:<8} {:>14} {:>+8.2} {:>7.2} {:>6.1}  {}\n",
            index + 1,
            r.symbol,
            r.price.round_dp(6).to_string(),
            r.change_24h,
            r.score,
            r.confidence,
            top.join(", ")
        ));
        if explain {
            for c in &r.explanation {
                out.push_str(&format!(
                    "        {:<22} norm {:>5.3}  w {:>5.3}  +{:>6.2}  {}\n",
                    c.feature.as_str(),
                    c.normalized,
                    c.weight,
                    c.contribution,
                    c.note
                ));
            }
        }
    }
    out
}
