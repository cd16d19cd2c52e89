//! File relay example.
//!
//! Decodes an audio file in one pipeline and plays it through a second one,
//! relaying every buffer across an appsink/appsrc pair.
//!
//! Run with: cargo run --example relay_file --features gstreamer -- song.mp3

use stream_relay::{
    Completion, FormatPreset, GstFactory, PipelineDescription, RelayEvent, StreamRelay,
};

#[tokio::main]
async fn main() {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: relay_file <audio file>");
        std::process::exit(2);
    };

    let factory = match GstFactory::new() {
        Ok(factory) => factory,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(-1);
        }
    };

    let format = FormatPreset::CdQuality.descriptor();
    let source = PipelineDescription::file_decoder(&path, &format, "relay_sink");
    let sink = PipelineDescription::app_player(&format, "relay_src");
    println!("source: {source}");
    println!("sink:   {sink}");

    let session = StreamRelay::builder()
        .factory(factory)
        .caps(format)
        .source_description(source.to_string(), "relay_sink")
        .sink_description(sink.to_string(), "relay_src")
        .on_event(|event| {
            if let RelayEvent::StateChanged { from, to } = event {
                println!("relay {from} -> {to}");
            }
        })
        .start();

    let session = match session {
        Ok(session) => session,
        Err(e) => {
            eprintln!("failed to start relay: {e}");
            std::process::exit(-1);
        }
    };

    // Ctrl+C stops early; both pipelines are still shut down cleanly
    let stop = session.stop_handle();
    let monitor = session.monitor();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    match session.run().await {
        Ok(Completion::EndOfStream) => println!("playback finished"),
        Ok(Completion::Stopped) => println!("playback stopped"),
        Err(e) => {
            eprintln!("relay failed: {e}");
            println!("Stats: {:?}", monitor.stats());
            std::process::exit(1);
        }
    }
    println!("Stats: {:?}", monitor.stats());
}
