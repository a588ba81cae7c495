use std::collections::BTreeSet;

use mzdata::{
    meta::{DataProcessing, FileMetadataConfig, ProcessingMethod, Software, custom_software_name},
    prelude::*,
    spectrum::MultiLayerSpectrum,
};

/// An in-memory collection of spectra in acquisition order along with the
/// file-level metadata of the file they were read from.
#[derive(Debug, Default, Clone)]
pub struct Experiment {
    spectra: Vec<MultiLayerSpectrum>,
    mz_metadata: FileMetadataConfig,
}

impl Experiment {
    pub fn new(spectra: Vec<MultiLayerSpectrum>) -> Self {
        Self {
            spectra,
            ..Default::default()
        }
    }

    /// Drain a spectrum source into memory, keeping its metadata
    pub fn from_source<R>(source: R) -> Self
    where
        R: Iterator<Item = MultiLayerSpectrum> + MSDataFileMetadata,
    {
        let mut this = Self::default();
        this.copy_metadata_from(&source);
        this.spectra = source.collect();
        this
    }

    pub fn spectra(&self) -> &[MultiLayerSpectrum] {
        &self.spectra
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MultiLayerSpectrum> {
        self.spectra.iter()
    }

    pub fn push(&mut self, spectrum: MultiLayerSpectrum) {
        self.spectra.push(spectrum);
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// Whether the spectra are in non-decreasing start time order
    pub fn is_sorted(&self) -> bool {
        self.spectra
            .windows(2)
            .all(|w| w[0].start_time() <= w[1].start_time())
    }

    /// Stable sort of the spectra by start time, then renumber their indices
    pub fn sort_spectra(&mut self) {
        self.spectra
            .sort_by(|a, b| a.start_time().total_cmp(&b.start_time()));
        self.reindex();
    }

    /// Make every spectrum's index match its position
    pub fn reindex(&mut self) {
        for (i, spectrum) in self.spectra.iter_mut().enumerate() {
            spectrum.description_mut().index = i;
        }
    }

    /// Move the spectra at `positions` into a new [`Experiment`] that shares this
    /// experiment's metadata. The result is sorted by start time and re-indexed.
    pub fn extract(self, positions: &BTreeSet<usize>) -> Experiment {
        let Self { spectra, mz_metadata } = self;

        let spectra = spectra
            .into_iter()
            .enumerate()
            .filter_map(|(i, s)| positions.contains(&i).then_some(s))
            .collect();

        let mut subset = Experiment { spectra, mz_metadata };
        subset.sort_spectra();
        subset
    }

    /// Record that this experiment was produced by `software_name`, appending a
    /// step to every existing data processing or creating a new one.
    pub fn add_processing_step(&mut self, software_name: &str, version: &str, options: String) {
        let mut k = 1;
        let mut software_id = format!("{software_name}{k}");
        while self.softwares().iter().any(|sw| sw.id == software_id) {
            k += 1;
            software_id = format!("{software_name}{k}");
        }
        self.softwares_mut().push(Software::new(
            software_id.clone(),
            version.to_string(),
            vec![custom_software_name(software_name)],
        ));

        let method = ProcessingMethod {
            order: 1,
            software_reference: software_id,
            params: vec![mzdata::Param::new_key_value("selection options", options)],
        };

        if self.data_processings().is_empty() {
            self.data_processings_mut().push(DataProcessing {
                id: format!("{software_name}_processing1"),
                methods: vec![method],
            });
        } else {
            for dp in self.data_processings_mut().iter_mut() {
                let mut next_step = method.clone();
                next_step.order = dp.methods.iter().map(|m| m.order).max().unwrap_or_default() + 1;
                dp.methods.push(next_step);
            }
        }
    }
}

impl MSDataFileMetadata for Experiment {
    mzdata::delegate_impl_metadata_trait!(mz_metadata);
}

impl IntoIterator for Experiment {
    type Item = MultiLayerSpectrum;
    type IntoIter = std::vec::IntoIter<MultiLayerSpectrum>;

    fn into_iter(self) -> Self::IntoIter {
        self.spectra.into_iter()
    }
}

impl<'a> IntoIterator for &'a Experiment {
    type Item = &'a MultiLayerSpectrum;
    type IntoIter = std::slice::Iter<'a, MultiLayerSpectrum>;

    fn into_iter(self) -> Self::IntoIter {
        self.spectra.iter()
    }
}

impl FromIterator<MultiLayerSpectrum> for Experiment {
    fn from_iter<T: IntoIterator<Item = MultiLayerSpectrum>>(iter: T) -> Self {
        let mut this = Self::new(iter.into_iter().collect());
        this.reindex();
        this
    }
}
