/*! Test coverage for the class model, culling, verification and lowering.
 *
 * Programs are assembled with the table builders rather than binary classfiles, so each test reads
 * like the bytecode listing it exercises.
 */

#![allow(unused_imports)]
#![allow(unused_variables)]

mod cull_tests;
mod dispatch_tests;
mod fixtures;
mod lowering_tests;
mod verify_tests;
