use rustfft::{FftPlanner, num_complex::Complex};

/// Samples per analysis frame
pub const FRAME_LEN: usize = 2048;
/// Samples between frame starts
pub const HOP_LEN: usize = 512;

/// Fraction of frame magnitude below the rolloff frequency
const ROLLOFF_PERCENT: f32 = 0.85;
/// Plausible tempo band for the autocorrelation search
const MIN_TEMPO_BPM: f32 = 30.0;
const MAX_TEMPO_BPM: f32 = 240.0;

/// Raw acoustic measurements of one mono waveform.
/// Every feature shape is derived from these numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSummary {
    pub tempo_bpm: f32,
    pub mean_rms: f32,
    pub mean_zero_crossing_rate: f32,
    pub mean_spectral_centroid_hz: f32,
    pub mean_spectral_rolloff_hz: f32,
    pub mean_spectral_bandwidth_hz: f32,
    pub mean_onset_strength: f32,
    pub sample_rate: u32,
}

/// Measure a mono waveform: framewise RMS and zero-crossing rate, spectral
/// shape from Hann-windowed FFT frames, and tempo from the onset envelope.
pub fn summarize(samples: &[f32], sample_rate: u32) -> AudioSummary {
    let spectra = magnitude_spectra(samples);
    let (centroid, rolloff, bandwidth) = spectral_shape(&spectra, sample_rate);
    let onsets = onset_envelope(&spectra);

    AudioSummary {
        tempo_bpm: estimate_tempo(&onsets, sample_rate),
        mean_rms: mean_rms(samples),
        mean_zero_crossing_rate: mean_zero_crossing_rate(samples),
        mean_spectral_centroid_hz: centroid,
        mean_spectral_rolloff_hz: rolloff,
        mean_spectral_bandwidth_hz: bandwidth,
        mean_onset_strength: mean(&onsets),
        sample_rate,
    }
}

/// Sliding analysis frames; empty when the signal is shorter than one frame
fn frames(samples: &[f32]) -> impl Iterator<Item = &[f32]> + '_ {
    (FRAME_LEN..=samples.len())
        .step_by(HOP_LEN)
        .map(move |end| &samples[end - FRAME_LEN..end])
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum();
    (energy / samples.len() as f32).sqrt()
}

fn mean_rms(samples: &[f32]) -> f32 {
    let frame_values: Vec<f32> = frames(samples).map(rms).collect();
    if frame_values.is_empty() {
        // Shorter than one frame: measure the whole signal at once
        return rms(samples);
    }
    mean(&frame_values)
}

fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 / frame.len() as f32
}

fn mean_zero_crossing_rate(samples: &[f32]) -> f32 {
    let rates: Vec<f32> = frames(samples).map(zero_crossing_rate).collect();
    if rates.is_empty() {
        return zero_crossing_rate(samples);
    }
    mean(&rates)
}

fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / len as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Magnitude spectrum of each frame, bins 0..=FRAME_LEN/2
fn magnitude_spectra(samples: &[f32]) -> Vec<Vec<f32>> {
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FRAME_LEN);
    let window = hann_window(FRAME_LEN);

    let mut spectra = Vec::new();
    let mut buffer = vec![Complex::new(0.0f32, 0.0f32); FRAME_LEN];
    for frame in frames(samples) {
        for (slot, (sample, coefficient)) in buffer.iter_mut().zip(frame.iter().zip(&window)) {
            *slot = Complex::new(sample * coefficient, 0.0);
        }
        fft.process(&mut buffer);
        spectra.push(buffer[..=FRAME_LEN / 2].iter().map(|c| c.norm()).collect());
    }
    spectra
}

/// Mean spectral centroid, rolloff and bandwidth in Hz across all frames.
/// Silent frames contribute zeros, matching the framewise mean convention.
fn spectral_shape(spectra: &[Vec<f32>], sample_rate: u32) -> (f32, f32, f32) {
    if spectra.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let hz_per_bin = sample_rate as f32 / FRAME_LEN as f32;

    let mut centroids = Vec::with_capacity(spectra.len());
    let mut rolloffs = Vec::with_capacity(spectra.len());
    let mut bandwidths = Vec::with_capacity(spectra.len());

    for magnitudes in spectra {
        let total: f32 = magnitudes.iter().sum();
        if total <= f32::EPSILON {
            centroids.push(0.0);
            rolloffs.push(0.0);
            bandwidths.push(0.0);
            continue;
        }

        let centroid = magnitudes
            .iter()
            .enumerate()
            .map(|(bin, m)| bin as f32 * hz_per_bin * m)
            .sum::<f32>()
            / total;
        centroids.push(centroid);

        let threshold = ROLLOFF_PERCENT * total;
        let mut cumulative = 0.0;
        let mut rolloff = 0.0;
        for (bin, m) in magnitudes.iter().enumerate() {
            cumulative += m;
            if cumulative >= threshold {
                rolloff = bin as f32 * hz_per_bin;
                break;
            }
        }
        rolloffs.push(rolloff);

        let variance = magnitudes
            .iter()
            .enumerate()
            .map(|(bin, m)| {
                let deviation = bin as f32 * hz_per_bin - centroid;
                m * deviation * deviation
            })
            .sum::<f32>()
            / total;
        bandwidths.push(variance.sqrt());
    }

    (mean(&centroids), mean(&rolloffs), mean(&bandwidths))
}

/// Positive spectral flux per frame, normalized by frame magnitude so loud
/// and quiet recordings of the same material produce comparable envelopes
fn onset_envelope(spectra: &[Vec<f32>]) -> Vec<f32> {
    spectra
        .windows(2)
        .map(|pair| {
            let (previous, current) = (&pair[0], &pair[1]);
            let flux: f32 = current
                .iter()
                .zip(previous.iter())
                .map(|(c, p)| (c - p).max(0.0))
                .sum();
            let scale = current
                .iter()
                .sum::<f32>()
                .max(previous.iter().sum())
                .max(f32::EPSILON);
            flux / scale
        })
        .collect()
}

/// Dominant beat rate from the autocorrelation of the mean-centered onset
/// envelope, searched over lags inside the plausible tempo band.
/// Degenerate envelopes (silence, constant level) yield 0 BPM.
fn estimate_tempo(envelope: &[f32], sample_rate: u32) -> f32 {
    if envelope.len() < 4 {
        return 0.0;
    }
    let frame_rate = sample_rate as f32 / HOP_LEN as f32;
    let lag_min = ((60.0 * frame_rate / MAX_TEMPO_BPM).floor() as usize).max(1);
    let lag_max = ((60.0 * frame_rate / MIN_TEMPO_BPM).ceil() as usize).min(envelope.len() - 1);
    if lag_min >= lag_max {
        return 0.0;
    }

    let average = mean(envelope);
    let centered: Vec<f32> = envelope.iter().map(|v| v - average).collect();

    let mut best_lag = 0usize;
    let mut best_score = 0.0f32;
    for lag in lag_min..=lag_max {
        let score: f32 = centered[lag..]
            .iter()
            .zip(centered.iter())
            .map(|(a, b)| a * b)
            .sum();
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }

    if best_lag == 0 {
        return 0.0;
    }

    // A non-integer beat period can score its double-period lag highest.
    // Fold back to the faster tempo when the half lag carries comparable energy.
    let half_lag = best_lag / 2;
    if half_lag >= lag_min {
        let half_score: f32 = centered[half_lag..]
            .iter()
            .zip(centered.iter())
            .map(|(a, b)| a * b)
            .sum();
        if half_score >= 0.5 * best_score {
            best_lag = half_lag;
        }
    }

    60.0 * frame_rate / best_lag as f32
}
