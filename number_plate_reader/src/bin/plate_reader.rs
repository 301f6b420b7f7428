use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use number_plate_reader::config::Args;
use number_plate_reader::metrics;
use number_plate_reader::plate_detection::detection_pipeline::DetectionPipeline;
use number_plate_reader::plate_detection::event_sink::PlateEventSink;
use number_plate_reader::plate_detection::plate_detector::PlateDetector;
use number_plate_reader::plate_detection::plate_reader_node::PlateReaderNode;
use number_plate_reader::plate_detection::text_recognizer::TesseractRecognizer;
use number_plate_reader::plate_detection::video_reader::VideoReader;
use pyroscope::PyroscopeAgent;
use pyroscope_pprofrs::{pprof_backend, PprofConfig};
use rusted_pipe::graph::metrics::Metrics;
use rusted_pipe::{
    buffers::synchronizers::{real_time::RealTimeSynchronizer, timestamp::TimestampSynchronizer},
    graph::{
        build::{link, Graph},
        processor::{Node, SourceNode, TerminalNode},
    },
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn setup_graph(args: &Args) -> anyhow::Result<Graph> {
    let config = args.pipeline_config()?;
    info!(
        "Plate class {}, threshold {}, {} known plates",
        config.plate_class_id,
        config.similarity_threshold,
        config.registry.len()
    );

    // Create the nodes

    // Node that reads the frames from the video source
    let mut video_input_node = SourceNode::create_common(
        "video_input".to_string(),
        Box::new(
            VideoReader::new(&args.video, args.fps, args.loop_video)
                .with_context(|| format!("opening {}", args.video))?,
        ),
    );

    let timestamp_synch = TimestampSynchronizer::default();
    // Frames and detections are dispatched as they come, without waiting
    // for the other channel.
    let realtime_synch = RealTimeSynchronizer::new(1e8 as u128, false, true);

    // Node that finds plates in each frame
    let mut plate_detector_node = Node::create_common(
        "plate_detector".to_string(),
        Box::new(
            PlateDetector::new(
                &args.detector_model,
                args.detector_input_size,
                args.detector_confidence,
                config.plate_class_id,
                args.use_gpu,
            )
            .with_context(|| format!("loading {}", args.detector_model))?,
        ),
        false,
        1,
        1,
        Box::new(timestamp_synch.clone()),
        true,
    );

    // Node that crops, reads and matches the plates against the latest frame
    let recognizer = TesseractRecognizer::new(&args.tessdata, &args.ocr_language)?
        .with_trim_border(!args.ocr_no_trim)
        .with_deblur(args.ocr_deblur);
    let pipeline = DetectionPipeline::new(config, Box::new(recognizer));
    let mut plate_reader_node = Node::create_common(
        "plate_reader".to_string(),
        Box::new(PlateReaderNode::new(pipeline)),
        false,
        2000,
        1,
        Box::new(realtime_synch.clone()),
        true,
    );

    // Node that publishes cropped plates and matched plate texts
    let event_sink_node = TerminalNode::create_common(
        "plate_events".to_string(),
        Box::new(PlateEventSink::new(args.crop_dir.as_ref().map(PathBuf::from))?),
        false,
        2000,
        1,
        Box::new(timestamp_synch.clone()),
        true,
    );

    // Frame -> Plate Detector
    {
        let mut detector_inputs = plate_detector_node
            .read_channel
            .channels
            .write()
            .map_err(|_| anyhow!("plate detector inputs are poisoned"))?;
        link(
            video_input_node.write_channel.writer.c1(),
            detector_inputs.c1(),
        )
        .map_err(|err| anyhow!("linking frames to the plate detector: {err:?}"))?;
    }

    {
        let mut reader_inputs = plate_reader_node
            .read_channel
            .channels
            .write()
            .map_err(|_| anyhow!("plate reader inputs are poisoned"))?;

        // Frame -> Plate Reader
        link(
            video_input_node.write_channel.writer.c1(),
            reader_inputs.c1(),
        )
        .map_err(|err| anyhow!("linking frames to the plate reader: {err:?}"))?;

        // Plate Detector -> Plate Reader
        link(
            plate_detector_node.write_channel.writer.c1(),
            reader_inputs.c2(),
        )
        .map_err(|err| anyhow!("linking detections to the plate reader: {err:?}"))?;
    }

    // Plate Reader -> Events
    {
        let mut sink_inputs = event_sink_node
            .read_channel
            .channels
            .write()
            .map_err(|_| anyhow!("plate event inputs are poisoned"))?;
        link(plate_reader_node.write_channel.writer.c1(), sink_inputs.c1())
            .map_err(|err| anyhow!("linking plate events to the sink: {err:?}"))?;
    }

    let mut graph = Graph::new(Metrics::no_metrics());

    // We need to start each node independently
    graph.start_terminal_node(event_sink_node);
    graph.start_node(plate_reader_node);
    graph.start_node(plate_detector_node);
    graph.start_source_node(video_input_node);

    Ok(graph)
}

fn wait_for_shutdown(run_for_secs: u64) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("setting Ctrl-C handler")?;

    if run_for_secs == 0 {
        let _ = rx.recv();
    } else {
        let _ = rx.recv_timeout(Duration::from_secs(run_for_secs));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    metrics::register_metrics()?;

    let profiler = match &args.pyroscope_url {
        Some(url) => {
            let agent = PyroscopeAgent::builder(url.as_str(), "number_plate_reader")
                .backend(pprof_backend(PprofConfig::new().sample_rate(100)))
                .build()?;
            Some(agent.start()?)
        }
        None => None,
    };

    let mut graph = setup_graph(&args)?;
    info!("Number plate reader started, reading {}", args.video);

    wait_for_shutdown(args.run_for_secs)?;
    info!("Stopping");
    graph.stop(false, None);

    if let Some(profiler) = profiler {
        profiler.stop()?.shutdown();
    }
    info!("Metrics at shutdown:\n{}", metrics::gather_text()?);
    Ok(())
}
