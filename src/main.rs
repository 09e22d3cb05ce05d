use anyhow::Result;

fn main() -> Result<()> {
    modweave::cli::run()
}
