fn main() {
    posture_sentinel_lib::run()
}
