pub mod time;

/// Random url-safe identifier used for run ids.
pub fn longid() -> String {
    nanoid::nanoid!()
}
