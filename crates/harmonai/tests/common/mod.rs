//! In-process fakes for the model services and object store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use harmonai::models::{
    AudioPipeline, AudioRequest, ImagePipeline, ImageRequest, LanguageModel, Models,
};
use harmonai::pipeline::GenerationService;
use harmonai::storage::ObjectStore;
use tempfile::TempDir;

pub const FAKE_WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt fake audio";
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake cover";

/// Replies keep the surrounding whitespace a real model emits.
pub const DERIVED_PROMPT: &str = " rave, disco, funky, 140 BPM\n";
pub const DERIVED_LYRICS: &str = "\n[verse]\nDancing all night\n\n[chorus]\nUnder the lights\n\n";
pub const CATEGORY_REPLY: &str = "Pop, Electronic,  Sad ,80s,";

/// Language model that answers by instruction type and records every call.
#[derive(Default)]
pub struct RecordingLlm {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingLlm {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }
}

#[async_trait]
impl LanguageModel for RecordingLlm {
    async fn complete(&self, instruction: &str) -> Result<String> {
        self.calls.lock().unwrap().push(instruction.to_string());

        let reply = if instruction.contains("genres or categories") {
            CATEGORY_REPLY
        } else if instruction.contains("Write the lyrics") {
            DERIVED_LYRICS
        } else {
            DERIVED_PROMPT
        };
        Ok(reply.to_string())
    }
}

/// Language model whose every call fails.
pub struct FailingLlm;

#[async_trait]
impl LanguageModel for FailingLlm {
    async fn complete(&self, _instruction: &str) -> Result<String> {
        anyhow::bail!("Qwen API error 503 Service Unavailable: model not loaded")
    }
}

/// Audio pipeline that writes a fixed WAV and records its arguments.
#[derive(Default)]
pub struct RecordingAudio {
    pub requests: Mutex<Vec<AudioRequest>>,
    pub written: Mutex<Vec<PathBuf>>,
}

impl RecordingAudio {
    pub fn last_request(&self) -> AudioRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("audio pipeline was never called")
    }
}

#[async_trait]
impl AudioPipeline for RecordingAudio {
    async fn synthesize(&self, request: &AudioRequest, output_path: &Path) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::fs::write(output_path, FAKE_WAV).await?;
        self.written.lock().unwrap().push(output_path.to_path_buf());
        Ok(())
    }
}

/// Image pipeline returning a fixed PNG.
#[derive(Default)]
pub struct FakeImage {
    pub requests: Mutex<Vec<ImageRequest>>,
}

#[async_trait]
impl ImagePipeline for FakeImage {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<Vec<u8>>> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(vec![FAKE_PNG.to_vec(), b"second image".to_vec()])
    }
}

/// Image pipeline that returns no images.
pub struct NoImages;

#[async_trait]
impl ImagePipeline for NoImages {
    async fn generate(&self, _request: &ImageRequest) -> Result<Vec<Vec<u8>>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Object store kept in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                data,
            },
        );
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Object store that rejects every upload.
pub struct FailingStore;

#[async_trait]
impl ObjectStore for FailingStore {
    async fn put_file(&self, key: &str, _path: &Path, _content_type: &str) -> Result<()> {
        anyhow::bail!("upload of {} refused", key)
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

/// A generation service wired to fakes, with handles for inspection.
pub struct Harness {
    pub service: GenerationService,
    pub llm: Arc<RecordingLlm>,
    pub audio: Arc<RecordingAudio>,
    pub image: Arc<FakeImage>,
    pub store: Arc<MemoryStore>,
    pub output_dir: PathBuf,
    _scratch: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self::build(store.clone(), store, None, None)
    }

    /// Uploads always fail; `store` stays empty.
    pub fn with_failing_store() -> Self {
        Self::build(Arc::new(FailingStore), Arc::new(MemoryStore::default()), None, None)
    }

    /// Every language model call fails; `llm` records nothing.
    pub fn with_failing_llm() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self::build(store.clone(), store, Some(Arc::new(FailingLlm)), None)
    }

    /// The image model answers with an empty list; `image` records nothing.
    pub fn with_no_images() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self::build(store.clone(), store, None, Some(Arc::new(NoImages)))
    }

    fn build(
        object_store: Arc<dyn ObjectStore>,
        store: Arc<MemoryStore>,
        llm_override: Option<Arc<dyn LanguageModel>>,
        image_override: Option<Arc<dyn ImagePipeline>>,
    ) -> Self {
        let scratch = TempDir::new().unwrap();
        let output_dir = scratch.path().join("outputs");

        let llm = Arc::new(RecordingLlm::default());
        let audio = Arc::new(RecordingAudio::default());
        let image = Arc::new(FakeImage::default());

        let models = Models::new(
            audio.clone(),
            llm_override.unwrap_or_else(|| llm.clone() as Arc<dyn LanguageModel>),
            image_override.unwrap_or_else(|| image.clone() as Arc<dyn ImagePipeline>),
        );
        let service = GenerationService::new(models, object_store, &output_dir);

        Self {
            service,
            llm,
            audio,
            image,
            store,
            output_dir,
            _scratch: scratch,
        }
    }

    /// Files currently in the scratch directory.
    pub fn scratch_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.output_dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}
