use anyhow::{bail, Context};

use sfm_tri::config::DEFAULT_CONFIG_PATH;
use sfm_tri::dataset::{DefaultDataset, SceneReader};
use sfm_tri::{build_map, save, LevenbergMarquardtMinimizer, RunConfig, TriangulationPipeline};

/// `sfm-tri [config.json]` or `sfm-tri <reconstruction> <features> <matches> <output>`
fn read_config() -> anyhow::Result<RunConfig> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => RunConfig::from_json_file(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("failed to read config {}", DEFAULT_CONFIG_PATH)),
        [config_path] => RunConfig::from_json_file(config_path)
            .with_context(|| format!("failed to read config {}", config_path)),
        [reconstruction, features, matches, output] => {
            Ok(RunConfig::from_paths(reconstruction, features, matches, output))
        }
        _ => bail!(
            "usage: sfm-tri [config.json] | sfm-tri <reconstruction.json> <features.json> <matches.json> <output dir>"
        ),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_nanos()
        .init();

    let config = read_config()?;
    log::info!("config: {:?}", config);

    let scene = DefaultDataset::from_config(&config)
        .read_scene()
        .context("failed to read scene")?;
    let mut map = build_map(scene, &config.options).context("failed to preprocess scene")?;

    let minimizer = LevenbergMarquardtMinimizer::from_options(&config.options);
    let pipeline = TriangulationPipeline::new(config.options.clone(), minimizer);
    pipeline.run(&mut map).context("triangulation failed")?;

    save::save_reconstruction(&map, &config.output_path)
        .with_context(|| format!("failed to write {:?}", config.output_path))?;
    Ok(())
}
