use crate::config::InferenceConfig;

pub fn setup_logging(config: &InferenceConfig) -> anyhow::Result<()> {
    common::setup_logging(config.environment)
}
