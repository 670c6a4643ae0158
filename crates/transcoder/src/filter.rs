//! ffmpeg argument and filter-graph construction.

use std::path::Path;

use crate::process::TranscodeCommand;
use crate::tag::TagParameters;
use crate::{PostProcess, TranscoderConfig};

/// Build the `-filter_complex` graph.
///
/// Input 0 is the uploaded audio on stdin, input 1 the watermark asset and,
/// when `with_reverb` is set, input 2 the impulse response. The graph's sink
/// is labelled `[out]`.
pub fn filter_graph(tag: &TagParameters, post: &PostProcess, with_reverb: bool) -> String {
    let timing = tag.timing();
    let rate = post.sample_rate;
    let cycle_samples = (timing.cycle_secs * f64::from(rate)).round() as u64;
    let drop_ms = (timing.drop_offset_secs * 1000.0).round() as u64;

    let mut graph = Vec::with_capacity(5);

    // One tag per cycle: pad/trim the asset to exactly one cycle, then loop it.
    graph.push(format!(
        "[1:a]aresample={rate},apad=whole_dur={cycle:.6},atrim=end={cycle:.6},\
         aloop=loop=-1:size={cycle_samples},volume={gain},adelay=delays={drop_ms}:all=1[tag]",
        cycle = timing.cycle_secs,
        gain = tag.watermark_gain(),
    ));
    graph.push(format!("[0:a]aresample={rate}[main]"));
    graph.push(
        "[main][tag]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[tagged]"
            .to_string(),
    );

    let band_input = if with_reverb {
        graph.push(format!(
            "[tagged][2:a]afir=dry={}:wet={}[reverbed]",
            post.reverb_dry, post.reverb_wet
        ));
        "reverbed"
    } else {
        "tagged"
    };

    graph.push(format!(
        "[{band_input}]highpass=f={},lowpass=f={}[filtered]",
        post.highpass_hz, post.lowpass_hz
    ));
    graph.push(format!(
        "[filtered]asetrate={rate}*{},aresample={rate},atempo={}[out]",
        post.pitch, post.tempo
    ));

    graph.join(";")
}

/// Full ffmpeg invocation reading stdin and writing ADTS/AAC to stdout.
pub fn ffmpeg_command(
    config: &TranscoderConfig,
    tag: &TagParameters,
    watermark: &Path,
) -> TranscodeCommand {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        "pipe:0".into(),
        "-i".into(),
        watermark.to_string_lossy().into_owned(),
    ];

    if let Some(ir) = &config.impulse_response {
        args.extend(["-i".into(), ir.to_string_lossy().into_owned()]);
    }

    args.extend([
        "-filter_complex".into(),
        filter_graph(tag, &config.post, config.impulse_response.is_some()),
        "-map".into(),
        "[out]".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        config.bitrate.clone(),
        "-f".into(),
        "adts".into(),
        "pipe:1".into(),
    ]);

    TranscodeCommand::new(config.ffmpeg_path.clone()).args(args)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn tag() -> TagParameters {
        TagParameters::new(120.0, 2, 7.0, 0.5).unwrap()
    }

    #[test]
    fn graph_carries_derived_timing() {
        let graph = filter_graph(&tag(), &PostProcess::default(), false);
        assert!(graph.contains("apad=whole_dur=4.000000"));
        assert!(graph.contains("atrim=end=4.000000"));
        assert!(graph.contains("aloop=loop=-1:size=176400"));
        assert!(graph.contains("volume=0.5"));
        assert!(graph.contains("adelay=delays=3500:all=1"));
        assert!(graph.ends_with("[out]"));
    }

    #[test]
    fn graph_without_reverb_skips_afir() {
        let graph = filter_graph(&tag(), &PostProcess::default(), false);
        assert!(!graph.contains("afir"));
        assert!(graph.contains("[tagged]highpass=f=40,lowpass=f=3000[filtered]"));
    }

    #[test]
    fn graph_with_reverb_uses_third_input() {
        let graph = filter_graph(&tag(), &PostProcess::default(), true);
        assert!(graph.contains("[tagged][2:a]afir=dry=10:wet=10[reverbed]"));
        assert!(graph.contains("[reverbed]highpass"));
        assert!(graph.contains("asetrate=44100*0.83,aresample=44100,atempo=0.93[out]"));
    }

    #[test]
    fn command_pipes_stdin_to_stdout() {
        let config = TranscoderConfig {
            impulse_response: Some(PathBuf::from("/assets/ir.wav")),
            ..Default::default()
        };
        let cmd = ffmpeg_command(&config, &tag(), Path::new("/assets/tag.wav"));
        assert_eq!(cmd.program, PathBuf::from("ffmpeg"));

        let args = cmd.args.join(" ");
        assert!(args.starts_with("-hide_banner -loglevel error -i pipe:0 -i /assets/tag.wav -i /assets/ir.wav"));
        assert!(args.ends_with("-map [out] -c:a aac -b:a 256k -f adts pipe:1"));
    }
}
