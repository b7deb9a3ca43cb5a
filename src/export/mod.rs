// src/export/mod.rs
//! Artifact export: the side-by-side chart image, the server report and the
//! filtered records as CSV.
//!
//! Every path is compose-or-abort: a file only appears at its final name
//! once the complete payload is in hand.

pub mod compose;
pub mod download;
pub mod join;

use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::charts::{ChartKind, ChartRenderer};
use crate::config::ExportConfig;
use crate::error::{ClientError, ClientResult};
use crate::gateway::Gateway;
use crate::models::{DatasetId, EquipmentRecord, FilterFacets, SummaryStats};

pub use compose::{compose_side_by_side, encode_png};
pub use download::{DirectorySink, DownloadSink, StagedDownload};
pub use join::{ChartSide, JoinBarrier, JoinOutcome};

// ==================== COMPOSITE ====================

/// One composite export request. Each side reports once; the composite is
/// built and delivered exactly once, when both sides are in.
pub struct CompositeExport {
    id: Uuid,
    barrier: JoinBarrier<DynamicImage>,
    sink: Arc<dyn DownloadSink>,
    file_name: String,
    delivered: Mutex<Option<PathBuf>>,
}

impl CompositeExport {
    pub fn new(sink: Arc<dyn DownloadSink>, file_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            barrier: JoinBarrier::new(),
            sink,
            file_name: file_name.into(),
            delivered: Mutex::new(None),
        }
    }

    /// Returns the delivered path on the arrival that completes the pair.
    pub fn chart_ready(&self, side: ChartSide, chart: DynamicImage) -> ClientResult<Option<PathBuf>> {
        match self.barrier.arrive(side, chart) {
            JoinOutcome::Waiting => Ok(None),
            JoinOutcome::Ignored => {
                log::debug!("Export {}: ignoring extra {:?} chart", self.id, side);
                Ok(None)
            }
            JoinOutcome::Ready(first, second) => {
                let surface = compose_side_by_side(&first, &second);
                let png = encode_png(&surface)?;
                let path = self.sink.deliver(&self.file_name, &png)?;
                log::info!("Export {}: charts saved to {}", self.id, path.display());
                *self.delivered.lock() = Some(path.clone());
                Ok(Some(path))
            }
        }
    }

    /// Abandons the export; later arrivals are ignored.
    pub fn chart_failed(&self, side: ChartSide, err: &ClientError) {
        if self.barrier.abort() {
            log::warn!("Export {}: {:?} chart failed: {}", self.id, side, err);
        }
    }

    pub fn delivered(&self) -> Option<PathBuf> {
        self.delivered.lock().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.barrier.is_closed()
    }
}

// ==================== EXPORTER ====================

pub struct ArtifactExporter {
    gateway: Arc<Gateway>,
    sink: Arc<dyn DownloadSink>,
    config: ExportConfig,
}

impl ArtifactExporter {
    pub fn new(gateway: Arc<Gateway>, sink: Arc<dyn DownloadSink>, config: ExportConfig) -> Self {
        Self { gateway, sink, config }
    }

    pub fn begin_composite(&self) -> CompositeExport {
        CompositeExport::new(self.sink.clone(), self.config.chart_file_name.clone())
    }

    /// Renders the bar chart (left) and the pie chart (right) concurrently
    /// and delivers the composite.
    pub async fn export_charts(
        &self,
        renderer: Arc<dyn ChartRenderer>,
        summary: &SummaryStats,
    ) -> ClientResult<PathBuf> {
        let export = Arc::new(self.begin_composite());

        let (sides, producers): (Vec<_>, Vec<_>) = [(ChartSide::First, ChartKind::Bar), (ChartSide::Second, ChartKind::Pie)]
            .into_iter()
            .map(|(side, kind)| {
                let export = export.clone();
                let renderer = renderer.clone();
                let distribution = summary.type_distribution.clone();
                let handle = tokio::task::spawn_blocking(move || match renderer.render(kind, &distribution) {
                    Ok(chart) => export.chart_ready(side, chart),
                    Err(e) => {
                        export.chart_failed(side, &e);
                        Err(e)
                    }
                });
                (side, handle)
            })
            .unzip();

        let mut failure = None;
        let joined = futures::future::join_all(producers).await;
        for (side, result) in sides.into_iter().zip(joined) {
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    let err = ClientError::Export(format!("{:?} chart task failed: {}", side, e));
                    export.chart_failed(side, &err);
                    failure.get_or_insert(err);
                }
            }
        }

        match (export.delivered(), failure) {
            (Some(path), _) => Ok(path),
            (None, Some(e)) => Err(e),
            (None, None) => Err(ClientError::Export("charts were not composed".into())),
        }
    }

    /// Fetches the dataset report and hands it to the sink. An empty body is
    /// an error; nothing is written in that case.
    pub async fn request_report(&self, dataset_id: DatasetId) -> ClientResult<PathBuf> {
        let payload = self
            .gateway
            .call("get_report", self.gateway.backend().get_report(dataset_id))
            .await?;

        if payload.bytes.is_empty() {
            return Err(ClientError::Export(format!("report for dataset {} is empty", dataset_id)));
        }

        let file_name = payload
            .file_name
            .unwrap_or_else(|| self.report_file_name(dataset_id));
        let path = self.sink.deliver(&file_name, &payload.bytes)?;
        log::info!("Report for dataset {} saved to {}", dataset_id, path.display());
        Ok(path)
    }

    pub fn report_file_name(&self, dataset_id: DatasetId) -> String {
        self.config.report_file_pattern.replace("{id}", &dataset_id.to_string())
    }

    /// Writes the given records with the table's column layout.
    pub fn export_records(
        &self,
        dataset_id: DatasetId,
        records: &[EquipmentRecord],
        facets: &FilterFacets,
    ) -> ClientResult<PathBuf> {
        let csv = records_csv(records, facets)?;
        let path = self.sink.deliver(&format!("dataset_{}_records.csv", dataset_id), &csv)?;
        log::info!("{} records of dataset {} saved to {}", records.len(), dataset_id, path.display());
        Ok(path)
    }
}

pub fn records_csv(records: &[EquipmentRecord], facets: &FilterFacets) -> ClientResult<Vec<u8>> {
    let mut csv_data = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut csv_data);
        writer.write_record(facets.record_columns())?;

        for record in records {
            let mut row = Vec::with_capacity(5);
            if facets.name_supported {
                row.push(record.name.clone().unwrap_or_default());
            }
            row.push(record.equipment_type.clone());
            row.push(record.flowrate.to_string());
            row.push(record.pressure.to_string());
            row.push(record.temperature.to_string());
            writer.write_record(&row)?;
        }

        writer.flush()?;
    }
    Ok(csv_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ReportPayload;
    use crate::charts::RasterChartRenderer;
    use crate::testing::{self, FakeBackend};
    use image::{Rgba, RgbaImage};
    use std::collections::BTreeMap;
    use std::fs;

    fn solid(color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(70, 50, Rgba(color)))
    }

    fn exporter(backend: Arc<FakeBackend>, dir: &std::path::Path) -> ArtifactExporter {
        ArtifactExporter::new(
            testing::gateway(backend),
            Arc::new(DirectorySink::new(dir)),
            ExportConfig::default(),
        )
    }

    struct FailingSink;

    impl DownloadSink for FailingSink {
        fn deliver(&self, _: &str, _: &[u8]) -> ClientResult<PathBuf> {
            Err(ClientError::Export("disk full".into()))
        }
    }

    struct PanickingPie;

    impl ChartRenderer for PanickingPie {
        fn render(&self, kind: ChartKind, distribution: &BTreeMap<String, i64>) -> ClientResult<DynamicImage> {
            match kind {
                ChartKind::Pie => panic!("pie renderer crashed"),
                ChartKind::Bar => RasterChartRenderer::default().render(kind, distribution),
            }
        }
    }

    #[tokio::test]
    async fn test_crashed_chart_task_reports_its_side() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = exporter(FakeBackend::shared(), dir.path());
        let summary = testing::summarize(&testing::ten_records());

        let err = exporter.export_charts(Arc::new(PanickingPie), &summary).await.unwrap_err();
        match err {
            ClientError::Export(msg) => assert!(msg.starts_with("Second chart task failed"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_composite_identical_in_either_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink: Arc<dyn DownloadSink> = Arc::new(DirectorySink::new(dir.path()));
        let red = solid([255, 0, 0, 255]);
        let blue = solid([0, 0, 255, 255]);

        let a_first = CompositeExport::new(sink.clone(), "a.png");
        assert_eq!(a_first.chart_ready(ChartSide::First, red.clone()).unwrap(), None);
        let path_a = a_first.chart_ready(ChartSide::Second, blue.clone()).unwrap().unwrap();

        let b_first = CompositeExport::new(sink.clone(), "b.png");
        assert_eq!(b_first.chart_ready(ChartSide::Second, blue.clone()).unwrap(), None);
        let path_b = b_first.chart_ready(ChartSide::First, red.clone()).unwrap().unwrap();

        let a = image::open(&path_a).unwrap().to_rgba8();
        let b = image::open(&path_b).unwrap().to_rgba8();
        assert_eq!(a, b);
        assert_eq!(a.get_pixel(100, 100), &Rgba([255, 0, 0, 255]));
        assert_eq!(a.get_pixel(1000, 100), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_duplicate_signal_does_not_recompose() {
        let dir = tempfile::tempdir().unwrap();
        let export = CompositeExport::new(Arc::new(DirectorySink::new(dir.path())), "charts.png");

        export.chart_ready(ChartSide::First, solid([1, 2, 3, 255])).unwrap();
        let path = export.chart_ready(ChartSide::Second, solid([4, 5, 6, 255])).unwrap().unwrap();
        let before = fs::metadata(&path).unwrap().modified().unwrap();

        assert_eq!(export.chart_ready(ChartSide::Second, solid([9, 9, 9, 255])).unwrap(), None);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_sink_failure_leaves_no_file() {
        let export = CompositeExport::new(Arc::new(FailingSink), "charts.png");
        export.chart_ready(ChartSide::First, solid([1, 2, 3, 255])).unwrap();
        assert!(export.chart_ready(ChartSide::Second, solid([1, 2, 3, 255])).is_err());
        assert_eq!(export.delivered(), None);
        assert!(export.is_finished());
    }

    #[tokio::test]
    async fn test_export_charts_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = exporter(FakeBackend::shared(), dir.path());
        let summary = testing::summarize(&testing::ten_records());

        let path = exporter
            .export_charts(Arc::new(RasterChartRenderer::default()), &summary)
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("equipment_charts.png"));
        let composite = image::open(&path).unwrap();
        assert_eq!((composite.width(), composite.height()), (1400, 500));
    }

    #[tokio::test]
    async fn test_export_charts_without_data_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = exporter(FakeBackend::shared(), dir.path());
        let summary = testing::summarize(&[]);

        assert!(exporter
            .export_charts(Arc::new(RasterChartRenderer::default()), &summary)
            .await
            .is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_report_uses_server_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::shared();
        backend.set_report(5, ReportPayload { bytes: b"%PDF-1.4".to_vec(), file_name: Some("summary.pdf".into()) });
        backend.set_report(6, ReportPayload { bytes: b"%PDF-1.4".to_vec(), file_name: None });
        let exporter = exporter(backend, dir.path());

        assert_eq!(exporter.request_report(5).await.unwrap(), dir.path().join("summary.pdf"));
        assert_eq!(exporter.request_report(6).await.unwrap(), dir.path().join("dataset_6_report.pdf"));
    }

    #[tokio::test]
    async fn test_empty_or_failed_report_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::shared();
        backend.set_report(5, ReportPayload { bytes: Vec::new(), file_name: None });
        let exporter = exporter(backend, dir.path());

        assert!(exporter.request_report(5).await.is_err());
        assert!(exporter.request_report(9).await.unwrap_err().needs_catalog_refresh());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_records_csv_columns() {
        let records = vec![testing::record("pump", 2.5)];
        let with_names = FilterFacets { name_supported: true, total: 1, ..Default::default() };
        let csv = String::from_utf8(records_csv(&records, &with_names).unwrap()).unwrap();
        assert_eq!(csv, "Equipment Name,Type,Flowrate,Pressure,Temperature\npump-2.5,pump,102.5,2.5,80\n");

        let without = FilterFacets { total: 1, ..Default::default() };
        let csv = String::from_utf8(records_csv(&records, &without).unwrap()).unwrap();
        assert_eq!(csv, "Type,Flowrate,Pressure,Temperature\npump,102.5,2.5,80\n");
    }
}
