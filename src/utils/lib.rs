use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::io;
use clap::Parser;

pub const MONGO_URI_ENV: &str = "MONGO_URI";
pub const DEFAULT_MONGO_URI: &str = "mongodb://localhost:27017/";
pub const DEFAULT_DATABASE: &str = "clbp-predictive-system";
pub const DEFAULT_COLLECTION: &str = "predictionmodels";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Id of the training job record to update
    #[clap(value_parser)]
    pub model_id: Option<String>,

    /// Training configuration as a JSON object
    #[clap(value_parser)]
    pub config: Option<String>,

    /// MongoDB connection string (falls back to $MONGO_URI)
    #[clap(long)]
    pub mongo_uri: Option<String>,

    #[clap(long)]
    pub database: Option<String>,

    #[clap(long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Draw a progress bar on stderr
    #[clap(long)]
    pub progress: bool,
}

/// Where training job records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub uri: String,
    /// Explicit database; when `None` the URI's default database is used.
    pub database: Option<String>,
    pub collection: String,
}

impl StoreSettings {
    pub fn resolve(args: &Args) -> Self {
        Self::from_parts(
            args.mongo_uri.clone(),
            env::var(MONGO_URI_ENV).ok(),
            args.database.clone(),
            args.collection.clone(),
        )
    }

    fn from_parts(
        flag_uri: Option<String>,
        env_uri: Option<String>,
        database: Option<String>,
        collection: String,
    ) -> Self {
        let uri = flag_uri
            .or(env_uri)
            .filter(|uri| !uri.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MONGO_URI.to_string());
        Self { uri, database, collection }
    }
}

pub fn create_progress_bar(total: u64) -> Result<ProgressBar, io::Error> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_uri_wins_over_env() {
        let settings = StoreSettings::from_parts(
            Some("mongodb://flag:27017/".to_string()),
            Some("mongodb://env:27017/".to_string()),
            None,
            DEFAULT_COLLECTION.to_string(),
        );
        assert_eq!(settings.uri, "mongodb://flag:27017/");
    }

    #[test]
    fn test_env_then_default_uri() {
        let settings = StoreSettings::from_parts(
            None,
            Some("mongodb://env:27017/clbp".to_string()),
            None,
            DEFAULT_COLLECTION.to_string(),
        );
        assert_eq!(settings.uri, "mongodb://env:27017/clbp");

        let settings =
            StoreSettings::from_parts(None, Some("  ".to_string()), None, "jobs".to_string());
        assert_eq!(settings.uri, DEFAULT_MONGO_URI);
        assert_eq!(settings.collection, "jobs");
    }

    #[test]
    fn test_args_accept_missing_positionals() {
        let args = Args::try_parse_from(["model-trainer"]).unwrap();
        assert!(args.model_id.is_none());
        assert_eq!(args.collection, DEFAULT_COLLECTION);
    }
}
