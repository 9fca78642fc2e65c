mod aggregator;
mod args;
mod columns;
mod dataset;
mod date;
mod delimiter;
mod detalhes;
mod error;
mod filters;
mod ingest;
mod lookup;
mod metadata;
mod metrics;
mod ofensores;
mod persistence;
mod placas;
mod prazo;
mod regex;
mod report;

pub use self::{
    aggregator::*, args::*, columns::*, dataset::*, date::*, delimiter::*, detalhes::*, error::*,
    filters::*, ingest::*, lookup::*, metadata::*, metrics::*, ofensores::*, persistence::*,
    placas::*, prazo::*, regex::*, report::*,
};
