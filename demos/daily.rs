// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Run with `TUNWG_RUN_SERVER=true` to write `log/<day><Month><year>.log`, otherwise entries go to
//! standard error.

fn main() {
    let handle = match daylog::init(daylog::Config::from_env()) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("failed to set up logging: {err}");
            std::process::exit(1);
        }
    };

    let logger = handle.logger().clone();
    let _ = logger.info("demo started");
    let _ = logger.warn("this is a warning");
    let _ = logger.error("something went wrong", "simulated failure");

    handle.apply();
    log::info!("records of the log crate go to the same place");
}
