mod thunk;
