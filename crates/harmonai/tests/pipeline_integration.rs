//! Pipeline behavior against in-process model fakes.

mod common;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use common::*;
use harmonai::params::{GenerationParameters, INSTRUMENTAL_SENTINEL};
use harmonai::pipeline::{COVER_PROMPT_SUFFIX, SMOKE_LYRICS, SMOKE_PROMPT};
use harmonai::request::{GenerationRequest, SongSource};

fn request(source: SongSource, instrumental: bool) -> GenerationRequest {
    GenerationRequest {
        source,
        params: GenerationParameters {
            instrumental,
            ..GenerationParameters::default()
        },
    }
}

fn description() -> SongSource {
    SongSource::Description {
        full_described_song: "A funky rave track with a disco vibe".to_string(),
    }
}

fn custom_lyrics() -> SongSource {
    SongSource::CustomLyrics {
        prompt: "synthwave, 100 BPM".to_string(),
        lyrics: "[verse]\nNeon lights they shimmer".to_string(),
    }
}

fn described_lyrics() -> SongSource {
    SongSource::DescribedLyrics {
        prompt: "rave, disco, funky".to_string(),
        described_lyrics: "lyrics about dancing".to_string(),
    }
}

#[tokio::test]
async fn test_description_derives_prompt_lyrics_and_categories() {
    let h = Harness::new();
    let response = h.service.generate(request(description(), false)).await.unwrap();

    assert_eq!(h.llm.calls().len(), 3);
    assert_eq!(h.llm.count_matching("Reformat the following"), 1);
    assert_eq!(h.llm.count_matching("Write the lyrics"), 1);
    assert_eq!(h.llm.count_matching("genres or categories"), 1);
    assert!(h.llm.calls()[2].contains("A funky rave track with a disco vibe"));

    let audio = h.audio.last_request();
    assert_eq!(audio.prompt, DERIVED_PROMPT);
    assert_eq!(audio.lyrics, DERIVED_LYRICS);

    assert_eq!(response.categories, vec!["Pop", "Electronic", "Sad", "80s"]);
}

#[tokio::test]
async fn test_description_instrumental_skips_lyrics() {
    let h = Harness::new();
    h.service.generate(request(description(), true)).await.unwrap();

    assert_eq!(h.llm.calls().len(), 2);
    assert_eq!(h.llm.count_matching("Write the lyrics"), 0);
    assert_eq!(h.audio.last_request().lyrics, INSTRUMENTAL_SENTINEL);
}

#[tokio::test]
async fn test_custom_lyrics_pass_through() {
    let h = Harness::new();
    h.service.generate(request(custom_lyrics(), false)).await.unwrap();

    let calls = h.llm.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains("genres or categories"));
    assert!(calls[0].contains("synthwave, 100 BPM"));

    let audio = h.audio.last_request();
    assert_eq!(audio.prompt, "synthwave, 100 BPM");
    assert_eq!(audio.lyrics, "[verse]\nNeon lights they shimmer");
}

#[tokio::test]
async fn test_custom_lyrics_instrumental_uses_sentinel() {
    let h = Harness::new();
    h.service.generate(request(custom_lyrics(), true)).await.unwrap();
    assert_eq!(h.audio.last_request().lyrics, INSTRUMENTAL_SENTINEL);
}

#[tokio::test]
async fn test_described_lyrics_derives_only_lyrics() {
    let h = Harness::new();
    h.service.generate(request(described_lyrics(), false)).await.unwrap();

    assert_eq!(h.llm.calls().len(), 2);
    assert_eq!(h.llm.count_matching("Reformat the following"), 0);
    assert!(h.llm.calls()[0].contains("lyrics about dancing"));
    // Categories come from the prompt, not the lyric description
    assert!(h.llm.calls()[1].contains("'rave, disco, funky'"));

    let audio = h.audio.last_request();
    assert_eq!(audio.prompt, "rave, disco, funky");
    assert_eq!(audio.lyrics, DERIVED_LYRICS);
}

#[tokio::test]
async fn test_described_lyrics_instrumental_makes_one_call() {
    let h = Harness::new();
    h.service.generate(request(described_lyrics(), true)).await.unwrap();

    assert_eq!(h.llm.calls().len(), 1);
    assert_eq!(h.audio.last_request().lyrics, INSTRUMENTAL_SENTINEL);
}

#[tokio::test]
async fn test_uploads_audio_and_first_cover() {
    let h = Harness::new();
    let response = h.service.generate(request(custom_lyrics(), false)).await.unwrap();

    assert!(response.s3_key.ends_with(".wav"));
    assert!(response.cover_image_s3_key.ends_with(".png"));
    assert_ne!(response.s3_key, response.cover_image_s3_key);
    assert_eq!(h.store.len(), 2);

    let audio = h.store.get(&response.s3_key).unwrap();
    assert_eq!(audio.data, FAKE_WAV);
    assert_eq!(audio.content_type, "audio/wav");

    let cover = h.store.get(&response.cover_image_s3_key).unwrap();
    assert_eq!(cover.data, FAKE_PNG);
    assert_eq!(cover.content_type, "image/png");
}

#[tokio::test]
async fn test_cover_prompt_and_settings() {
    let h = Harness::new();
    h.service.generate(request(custom_lyrics(), false)).await.unwrap();

    let requests = h.image.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].prompt,
        format!("synthwave, 100 BPM{}", COVER_PROMPT_SUFFIX)
    );
    assert_eq!(requests[0].num_inference_steps, 2);
    assert_eq!(requests[0].guidance_scale, 0.0);
}

#[tokio::test]
async fn test_parameters_reach_audio_pipeline() {
    let h = Harness::new();
    let mut req = request(custom_lyrics(), false);
    req.params.audio_duration = 42.5;
    req.params.seed = 7;
    req.params.scheduler_type = "heun".to_string();
    req.params.oss_steps = vec![5, 10, 15];
    h.service.generate(req).await.unwrap();

    let audio = h.audio.last_request();
    assert_eq!(audio.audio_duration, 42.5);
    assert_eq!(audio.manual_seeds.as_deref(), Some("7"));
    assert_eq!(audio.scheduler_type, "heun");
    assert_eq!(audio.oss_steps, vec![5, 10, 15]);
}

#[tokio::test]
async fn test_scratch_dir_empty_after_success() {
    let h = Harness::new();
    h.service.generate(request(description(), false)).await.unwrap();

    assert!(h.output_dir.is_dir());
    assert!(h.scratch_files().is_empty(), "left behind: {:?}", h.scratch_files());
}

#[tokio::test]
async fn test_failed_upload_leaves_scratch_file() {
    let h = Harness::with_failing_store();
    let err = h
        .service
        .generate(request(custom_lyrics(), false))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("refused"));

    let written = h.audio.written.lock().unwrap().clone();
    assert_eq!(written.len(), 1);
    assert!(written[0].exists());
    assert_eq!(h.scratch_files(), written);

    // Nothing after the failed audio upload ran
    assert!(h.image.requests.lock().unwrap().is_empty());
    assert!(h.llm.calls().is_empty());
}

#[tokio::test]
async fn test_smoke_returns_inline_audio() {
    let h = Harness::new();
    let response = h.service.generate_smoke().await.unwrap();

    assert_eq!(BASE64.decode(&response.audio_data).unwrap(), FAKE_WAV);
    assert!(h.scratch_files().is_empty());
    assert_eq!(h.store.len(), 0);
    assert!(h.llm.calls().is_empty());
    assert!(h.image.requests.lock().unwrap().is_empty());

    let audio = h.audio.last_request();
    assert_eq!(audio.prompt, SMOKE_PROMPT);
    assert_eq!(audio.lyrics, SMOKE_LYRICS);
    assert_eq!(audio.audio_duration, 221.42547916666666);
    assert_eq!(audio.infer_step, 60);
    assert!(audio.manual_seeds.is_none());
}

#[tokio::test]
async fn test_derived_text_reaches_audio_untrimmed() {
    let h = Harness::new();
    h.service.generate(request(description(), false)).await.unwrap();

    let audio = h.audio.last_request();
    assert_eq!(audio.prompt, " rave, disco, funky, 140 BPM\n");
    assert_eq!(audio.lyrics, "\n[verse]\nDancing all night\n\n[chorus]\nUnder the lights\n\n");
}

#[tokio::test]
async fn test_llm_failure_stops_before_audio() {
    let h = Harness::with_failing_llm();
    let err = h
        .service
        .generate(request(description(), false))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("model not loaded"));
    assert!(h.audio.requests.lock().unwrap().is_empty());
    assert_eq!(h.store.len(), 0);
}

#[tokio::test]
async fn test_empty_image_list_fails_after_audio_upload() {
    let h = Harness::with_no_images();
    let err = h
        .service
        .generate(request(custom_lyrics(), false))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no images"));

    // Audio was already stored before the cover step ran
    let objects = h.store.objects.lock().unwrap();
    assert_eq!(objects.len(), 1);
    let (key, audio) = objects.iter().next().unwrap();
    assert!(key.ends_with(".wav"));
    assert_eq!(audio.data, FAKE_WAV);
    drop(objects);

    // Categories are derived last, so the LLM was never asked
    assert!(h.llm.calls().is_empty());
}
