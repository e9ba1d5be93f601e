use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::error::{PayModelError, Result};
use super::types::InflationMeasure;

/// One year of published pay and price data. `None` inflation means no data
/// was published for that measure; a genuine zero rate is `Some(0.0)`.
/// `pay_award` is `None` when the award differs per band.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalRecord {
    pub year_label: String,
    pub pay_award: Option<f64>,
    pub rpi: Option<f64>,
    pub cpi: Option<f64>,
    pub cpih: Option<f64>,
}

impl HistoricalRecord {
    pub fn new(
        year_label: &str,
        pay_award: Option<f64>,
        rpi: Option<f64>,
        cpi: Option<f64>,
        cpih: Option<f64>,
    ) -> Self {
        Self {
            year_label: year_label.to_string(),
            pay_award,
            rpi,
            cpi,
            cpih,
        }
    }

    pub fn inflation(&self, measure: InflationMeasure) -> Option<f64> {
        match measure {
            InflationMeasure::Rpi => self.rpi,
            InflationMeasure::Cpi => self.cpi,
            InflationMeasure::Cpih => self.cpih,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalIndexTable {
    records: Vec<HistoricalRecord>,
    overrides: BTreeMap<(String, String), f64>,
    published_averages: BTreeMap<String, f64>,
}

impl HistoricalIndexTable {
    pub fn new(records: Vec<HistoricalRecord>) -> Self {
        Self {
            records,
            overrides: BTreeMap::new(),
            published_averages: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, year: &str, band_id: &str, award: f64) -> Self {
        self.overrides
            .insert((year.to_string(), band_id.to_string()), award);
        self
    }

    pub fn with_published_average(mut self, year: &str, award: f64) -> Self {
        self.published_averages.insert(year.to_string(), award);
        self
    }

    /// Doctors' pay awards against RPI/CPI/CPIH from the 2008/2009 baseline.
    pub fn standard() -> Self {
        let row = |year: &str, award: Option<f64>, rpi: f64, cpi: f64, cpih: f64| {
            HistoricalRecord::new(year, award, Some(rpi), Some(cpi), Some(cpih))
        };

        let records = vec![
            HistoricalRecord::new("2008/2009", Some(0.0), None, None, None),
            row("2009/2010", Some(0.015), 0.053, 0.037, 0.027),
            row("2010/2011", Some(0.010), 0.052, 0.045, 0.038),
            row("2011/2012", Some(0.000), 0.035, 0.030, 0.028),
            row("2012/2013", Some(0.000), 0.029, 0.024, 0.022),
            row("2013/2014", Some(0.010), 0.025, 0.018, 0.017),
            row("2014/2015", Some(0.000), 0.009, -0.001, 0.003),
            row("2015/2016", Some(0.000), 0.013, 0.003, 0.007),
            row("2016/2017", Some(0.010), 0.035, 0.027, 0.026),
            row("2017/2018", Some(0.010), 0.034, 0.024, 0.022),
            row("2018/2019", Some(0.020), 0.030, 0.021, 0.020),
            row("2019/2020", Some(0.023), 0.015, 0.008, 0.009),
            row("2020/2021", Some(0.030), 0.029, 0.015, 0.016),
            row("2021/2022", Some(0.030), 0.111, 0.090, 0.078),
            row("2022/2023", Some(0.030), 0.114, 0.087, 0.078),
            row("2023/2024", None, 0.033, 0.023, 0.030),
            row("2024/2025", None, 0.045, 0.035, 0.041),
        ];

        let mut table = Self::new(records)
            .with_published_average("2023/2024", 0.0371)
            .with_published_average("2024/2025", 0.0820);

        let band_awards = [
            ("Nodal 1", 0.1401, 0.0900),
            ("Nodal 2", 0.1341, 0.0860),
            ("Nodal 3", 0.1415, 0.0820),
            ("Nodal 4", 0.1221, 0.0770),
            ("Nodal 5", 0.1181, 0.0750),
        ];
        for (band_id, award_2023, award_2024) in band_awards {
            table = table
                .with_override("2023/2024", band_id, award_2023)
                .with_override("2024/2025", band_id, award_2024);
        }
        table
    }

    pub fn records(&self) -> &[HistoricalRecord] {
        &self.records
    }

    pub fn year_labels(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.year_label.as_str())
    }

    pub fn position(&self, year: &str) -> Result<usize> {
        self.records
            .iter()
            .position(|r| r.year_label == year)
            .ok_or_else(|| PayModelError::UnknownYear(year.to_string()))
    }

    pub fn lookup(&self, year: &str) -> Result<&HistoricalRecord> {
        self.position(year).map(|idx| &self.records[idx])
    }

    /// Records in `[start, end)`.
    pub fn slice(&self, start: &str, end: &str) -> Result<&[HistoricalRecord]> {
        let (start_idx, end_idx) = self.ordered_positions(start, end)?;
        Ok(&self.records[start_idx..end_idx])
    }

    /// Positions of `start` and `end`, requiring `start` strictly before `end`.
    pub fn ordered_positions(&self, start: &str, end: &str) -> Result<(usize, usize)> {
        let start_idx = self.position(start)?;
        let end_idx = self.position(end)?;
        if start_idx >= end_idx {
            return Err(PayModelError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok((start_idx, end_idx))
    }

    pub fn band_override(&self, year: &str, band_id: &str) -> Result<f64> {
        self.overrides
            .get(&(year.to_string(), band_id.to_string()))
            .copied()
            .ok_or_else(|| PayModelError::MissingOverride {
                year: year.to_string(),
                band_id: band_id.to_string(),
            })
    }

    pub fn published_average(&self, year: &str) -> Option<f64> {
        self.published_averages.get(year).copied()
    }

    /// Award for `record` as seen by `band_id`. Band-specific years fall back
    /// to the published average when the band has no override.
    pub fn resolve_award(&self, record: &HistoricalRecord, band_id: Option<&str>) -> Result<f64> {
        if let Some(award) = record.pay_award {
            return Ok(award);
        }

        let year = record.year_label.as_str();
        let missing = match band_id {
            Some(band_id) => match self.band_override(year, band_id) {
                Ok(award) => return Ok(award),
                Err(err) => err,
            },
            None => PayModelError::MissingOverride {
                year: year.to_string(),
                band_id: "average".to_string(),
            },
        };

        match self.published_average(year) {
            Some(average) => {
                debug!(
                    target: "pay_restoration::history",
                    year,
                    band = band_id.unwrap_or("-"),
                    average,
                    "no band override, using published average"
                );
                Ok(average)
            }
            None => Err(missing),
        }
    }

    pub fn lookup_for_band(&self, year: &str, band_id: Option<&str>) -> Result<HistoricalRecord> {
        let record = self.lookup(year)?;
        let award = self.resolve_award(record, band_id)?;
        Ok(HistoricalRecord {
            pay_award: Some(award),
            ..record.clone()
        })
    }
}
