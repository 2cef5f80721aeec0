use napi::Result as NapiResult;
use napi_derive::napi;
use serde::de::DeserializeOwned;
use serde::Serialize;

use practice_valuation_core::engine::{self, EngineRequest};
use practice_valuation_core::input::ValuationInput;
use practice_valuation_core::simulation::engine::StochasticInput;
use practice_valuation_core::valuation::dcf::DcfInput;
use practice_valuation_core::valuation::epv::EpvInput;
use practice_valuation_core::validation::bounds::{self, InputBounds};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

fn parse<T: DeserializeOwned>(json: &str) -> NapiResult<T> {
    serde_json::from_str(json).map_err(to_napi_error)
}

fn render<T: Serialize>(output: &T) -> NapiResult<String> {
    serde_json::to_string(output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

/// `{input, config?}` in, engine result envelope out.
#[napi]
pub fn value_practice(request_json: String) -> NapiResult<String> {
    let request: EngineRequest = parse(&request_json)?;
    let output = engine::run_request(&request).map_err(to_napi_error)?;
    render(&output)
}

// ---------------------------------------------------------------------------
// Single stages
// ---------------------------------------------------------------------------

#[napi]
pub fn run_simulation(input_json: String) -> NapiResult<String> {
    let input: StochasticInput = parse(&input_json)?;
    let output = practice_valuation_core::simulation::engine::run_simulation(&input)
        .map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn calculate_epv(input_json: String) -> NapiResult<String> {
    let input: EpvInput = parse(&input_json)?;
    let output =
        practice_valuation_core::valuation::epv::calculate_epv(&input).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn calculate_dcf(input_json: String) -> NapiResult<String> {
    let input: DcfInput = parse(&input_json)?;
    let output =
        practice_valuation_core::valuation::dcf::calculate_dcf(&input).map_err(to_napi_error)?;
    render(&output)
}

/// Practice record in; `bounds_json` optionally replaces the default table.
#[napi]
pub fn validate_inputs(input_json: String, bounds_json: Option<String>) -> NapiResult<String> {
    let input: ValuationInput = parse(&input_json)?;
    let table: InputBounds = match bounds_json {
        Some(json) => parse(&json)?,
        None => InputBounds::default(),
    };
    let output = bounds::validate_inputs(&input, &table).map_err(to_napi_error)?;
    render(&output)
}
