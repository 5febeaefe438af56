fn main() {
    // `VERGEN_GIT_SHA` is attached to every log line and metric
    if let Err(err) = vergen::EmitBuilder::builder().git_sha(true).emit() {
        panic!("Failed to emit the build metadata: {err}");
    }
}
