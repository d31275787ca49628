use std::sync::Arc;

use pcd_services::ImagerySource;

use crate::{
    cancel::CancellationToken,
    config::ColorizeConfig,
    events::{EventSink, LogEventSink},
    runner::{Colorizer, PointCloudColorizer},
};

pub struct ColorizerBuilder {
    config: ColorizeConfig,
    sink: Arc<dyn EventSink>,
    imagery: Option<Box<dyn ImagerySource>>,
    cancel: CancellationToken,
}

impl Default for ColorizerBuilder {
    fn default() -> Self {
        Self {
            config: ColorizeConfig::default(),
            sink: Arc::new(LogEventSink),
            imagery: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl ColorizerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ColorizeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Source of replacement rasters; without one, correction is skipped.
    pub fn imagery_source(mut self, imagery: Box<dyn ImagerySource>) -> Self {
        self.imagery = Some(imagery);
        self
    }

    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Box<dyn Colorizer> {
        Box::new(PointCloudColorizer::new(
            self.config,
            self.sink,
            self.imagery,
            self.cancel,
        ))
    }
}
