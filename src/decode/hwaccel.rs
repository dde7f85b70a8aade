//! Hardware decoder selection.
//!
//! Hardware acceleration is expressed as a ranked list of named decoder
//! candidates. Each candidate is opened and validated by decoding one real
//! frame before it is trusted; the first that survives wins, everything else
//! falls back to the software decoder.

use serde::{Deserialize, Serialize};

/// Vendor decode accelerators, in default priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwBackend {
    Cuvid,
    Vaapi,
    VideoToolbox,
    D3d11va,
    Qsv,
    Amf,
}

impl HwBackend {
    pub const ALL: [HwBackend; 6] = [
        HwBackend::Cuvid,
        HwBackend::Vaapi,
        HwBackend::VideoToolbox,
        HwBackend::D3d11va,
        HwBackend::Qsv,
        HwBackend::Amf,
    ];

    /// Suffix appended to a codec name to form the accelerated decoder name
    pub fn suffix(self) -> &'static str {
        match self {
            HwBackend::Cuvid => "cuvid",
            HwBackend::Vaapi => "vaapi",
            HwBackend::VideoToolbox => "videotoolbox",
            HwBackend::D3d11va => "d3d11va",
            HwBackend::Qsv => "qsv",
            HwBackend::Amf => "amf",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            HwBackend::Cuvid => "NVIDIA CUDA",
            HwBackend::Vaapi => "VAAPI",
            HwBackend::VideoToolbox => "VideoToolbox",
            HwBackend::D3d11va => "D3D11VA",
            HwBackend::Qsv => "Intel QuickSync",
            HwBackend::Amf => "AMD AMF",
        }
    }

    /// Codecs this backend commonly ships a dedicated decoder for
    fn common_codecs(self) -> &'static [&'static str] {
        match self {
            HwBackend::Cuvid | HwBackend::Vaapi => &["h264", "hevc", "av1"],
            HwBackend::VideoToolbox | HwBackend::D3d11va | HwBackend::Qsv | HwBackend::Amf => {
                &["h264", "hevc"]
            }
        }
    }
}

/// A named decoder to try
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderCandidate {
    pub decoder_name: String,
    pub backend: HwBackend,
}

impl DecoderCandidate {
    pub fn description(&self) -> String {
        format!("{} ({})", self.backend.description(), self.decoder_name)
    }
}

/// Build the ranked candidate list for a stream's codec.
///
/// For every backend the codec-specific decoder comes first, followed by the
/// backend's common decoders. Duplicates keep their first position.
pub fn decoder_candidates(codec_name: &str, backends: &[HwBackend]) -> Vec<DecoderCandidate> {
    let mut candidates: Vec<DecoderCandidate> = Vec::new();
    for &backend in backends {
        let specific = std::iter::once(codec_name).filter(|name| !name.is_empty());
        for codec in specific.chain(backend.common_codecs().iter().copied()) {
            let decoder_name = format!("{}_{}", codec, backend.suffix());
            if candidates.iter().all(|c| c.decoder_name != decoder_name) {
                candidates.push(DecoderCandidate {
                    decoder_name,
                    backend,
                });
            }
        }
    }
    candidates
}

/// Try candidates in order and keep the first one `attempt` accepts.
///
/// `attempt` must open the decoder and prove it by decoding one frame; any
/// error discards the candidate.
pub fn select_first<T, E, F>(candidates: &[DecoderCandidate], mut attempt: F) -> Option<(DecoderCandidate, T)>
where
    E: std::fmt::Display,
    F: FnMut(&DecoderCandidate) -> Result<T, E>,
{
    for candidate in candidates {
        match attempt(candidate) {
            Ok(value) => {
                log::info!("Using hardware decoder: {}", candidate.description());
                return Some((candidate.clone(), value));
            }
            Err(e) => log::debug!("Hardware decoder {} rejected: {}", candidate.description(), e),
        }
    }
    None
}

/// Run a probe that reads from `input`, then rewind `input` however the
/// probe went. A failed rewind takes precedence over the probe's result.
pub fn probe_rewound<S, T, E>(
    input: &mut S,
    probe: impl FnOnce(&mut S) -> Result<T, E>,
    rewind: impl FnOnce(&mut S) -> Result<(), E>,
) -> Result<T, E> {
    let outcome = probe(input);
    rewind(input)?;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_are_ranked_by_backend() {
        let candidates = decoder_candidates("vp9", &[HwBackend::Cuvid, HwBackend::Qsv]);
        let names: Vec<&str> = candidates.iter().map(|c| c.decoder_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["vp9_cuvid", "h264_cuvid", "hevc_cuvid", "av1_cuvid", "vp9_qsv", "h264_qsv", "hevc_qsv"]
        );
    }

    #[test]
    fn test_candidates_are_deduplicated() {
        let candidates = decoder_candidates("h264", &[HwBackend::VideoToolbox]);
        let names: Vec<&str> = candidates.iter().map(|c| c.decoder_name.as_str()).collect();
        assert_eq!(names, vec!["h264_videotoolbox", "hevc_videotoolbox"]);
    }

    #[test]
    fn test_no_backends_means_no_candidates() {
        assert!(decoder_candidates("h264", &[]).is_empty());
    }

    #[test]
    fn test_select_first_skips_failures() {
        let candidates = decoder_candidates("h264", &[HwBackend::Cuvid, HwBackend::Vaapi]);
        let mut tried = Vec::new();
        let selected = select_first(&candidates, |c| {
            tried.push(c.decoder_name.clone());
            if c.backend == HwBackend::Vaapi {
                Ok(42)
            } else {
                Err("probe decode failed")
            }
        });

        let (candidate, value) = selected.expect("vaapi should be accepted");
        assert_eq!(candidate.decoder_name, "h264_vaapi");
        assert_eq!(value, 42);
        assert_eq!(tried, vec!["h264_cuvid", "hevc_cuvid", "av1_cuvid", "h264_vaapi"]);
    }

    #[test]
    fn test_select_first_falls_through() {
        let candidates = decoder_candidates("h264", &HwBackend::ALL);
        let selected: Option<(DecoderCandidate, ())> = select_first(&candidates, |_| Err("unavailable"));
        assert!(selected.is_none());
    }

    #[test]
    fn test_failed_probe_still_rewinds() {
        // position in a packet stream; the probe reads three packets and fails
        let mut position = 0usize;
        let result: Result<(), &str> = probe_rewound(
            &mut position,
            |pos| {
                *pos += 3;
                Err("send_packet rejected")
            },
            |pos| {
                *pos = 0;
                Ok(())
            },
        );
        assert_eq!(result, Err("send_packet rejected"));
        assert_eq!(position, 0);
    }

    #[test]
    fn test_rewind_failure_wins() {
        let mut position = 0usize;
        let result = probe_rewound(&mut position, |pos| Ok::<_, &str>(*pos), |_| Err("seek refused"));
        assert_eq!(result, Err("seek refused"));
    }
}
