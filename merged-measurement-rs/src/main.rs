fn main() {
    merged_measurement::cli::run();
}
