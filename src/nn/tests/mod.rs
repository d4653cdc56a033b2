mod neuron;
