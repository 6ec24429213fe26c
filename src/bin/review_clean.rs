use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    review_clean::app::run_clean_app(std::env::args().skip(1))
}
